use std::{fmt, sync::Arc};

use strata_model::{Requirement, Wiring};
use strata_solver::{SolveError, Solver, Universe, UnmetRequirement};
use tokio_util::sync::CancellationToken;

/// Classified result of one solver invocation.
#[derive(Debug)]
pub enum ResolutionOutcome {
    Resolved(Wiring),
    Unresolved(Unresolved),
    Cancelled,
    Error(SolveError),
}

/// Requirements the solver could not satisfy, with a readable trace of how each was reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unresolved {
    pub unmet: Vec<UnmetRequirement>,
    pub trace: String,
}

impl Unresolved {
    pub fn new(unmet: Vec<UnmetRequirement>) -> Self {
        let trace = unmet
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Self { unmet, trace }
    }
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Resolution failed:")?;
        f.write_str(&self.trace)
    }
}

/// Runs a [`Solver`] under a cancellation token and classifies what it returns.
#[derive(Clone)]
pub struct SolverAdapter {
    solver: Arc<dyn Solver>,
}

impl fmt::Debug for SolverAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverAdapter").finish_non_exhaustive()
    }
}

impl SolverAdapter {
    pub fn new(solver: Arc<dyn Solver>) -> Self {
        Self { solver }
    }

    /// Once `cancel` fires the solver future is dropped without waiting for it to wind down.
    pub async fn resolve(
        &self,
        requirements: &[Requirement],
        universe: &Universe,
        cancel: &CancellationToken,
    ) -> ResolutionOutcome {
        if cancel.is_cancelled() {
            return ResolutionOutcome::Cancelled;
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return ResolutionOutcome::Cancelled,
            result = self.solver.solve(requirements, universe, cancel) => result,
        };

        match result {
            Ok(wiring) => {
                tracing::debug!(components = wiring.len(), "resolved");
                ResolutionOutcome::Resolved(wiring)
            }
            Err(SolveError::Unsatisfied { unmet }) => {
                tracing::debug!(unmet = unmet.len(), "unresolved");
                ResolutionOutcome::Unresolved(Unresolved::new(unmet))
            }
            Err(SolveError::Cancelled) => ResolutionOutcome::Cancelled,
            Err(err) => ResolutionOutcome::Error(err),
        }
    }
}
