pub mod index;
mod universe;

use std::{fmt, future::Future, pin::Pin};

pub use index::IndexSolver;
use miette::Diagnostic;
use strata_model::{ComponentId, Requirement, Wiring};
use tokio_util::sync::CancellationToken;
pub use universe::Universe;

pub type SolveFuture<'a> = Pin<Box<dyn Future<Output = Result<Wiring, SolveError>> + Send + 'a>>;

/// Capability-matching solver.
///
/// Given top-level requirements and a universe of components, produce a wiring that satisfies
/// every requirement transitively. Implementations should poll `cancel` at reasonable intervals;
/// callers are also free to drop the returned future once the token fires.
pub trait Solver: Send + Sync {
    fn solve<'a>(
        &'a self,
        requirements: &'a [Requirement],
        universe: &'a Universe,
        cancel: &'a CancellationToken,
    ) -> SolveFuture<'a>;
}

#[derive(Debug, thiserror::Error, Diagnostic)]
#[non_exhaustive]
pub enum SolveError {
    #[error("{} requirement(s) could not be satisfied", unmet.len())]
    #[diagnostic(code(solver::unsatisfied))]
    Unsatisfied { unmet: Vec<UnmetRequirement> },
    #[error("resolution was cancelled")]
    #[diagnostic(code(solver::cancelled))]
    Cancelled,
    #[error("solver failed: {0}")]
    #[diagnostic(code(solver::failed))]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A requirement no candidate could satisfy, with the chain of components that led to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnmetRequirement {
    /// `None` for a top-level run requirement.
    pub requirer: Option<ComponentId>,
    pub requirement: Requirement,
    /// Components selected on the way from the run requirements to `requirer`, outermost first.
    pub chain: Vec<ComponentId>,
}

impl fmt::Display for UnmetRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirer {
            Some(requirer) => write!(
                f,
                "Unable to resolve {requirer}: missing requirement {}",
                self.requirement
            )?,
            None => write!(
                f,
                "Unable to resolve <<INITIAL>>: missing requirement {}",
                self.requirement
            )?,
        }
        if self.chain.len() > 1 {
            f.write_str(" [chain: ")?;
            for (idx, id) in self.chain.iter().enumerate() {
                if idx > 0 {
                    f.write_str(" -> ")?;
                }
                write!(f, "{id}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}
