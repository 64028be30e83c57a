pub mod adapter;
pub mod cache;
pub mod collector;
pub mod level;
pub mod order;
pub mod reconcile;
pub mod workspace;

use std::sync::Arc;

pub use adapter::{ResolutionOutcome, SolverAdapter, Unresolved};
pub use cache::{CacheEntry, ResolutionCache};
pub use collector::collect_requirements;
pub use level::assign_levels;
use miette::Diagnostic;
pub use order::order;
pub use reconcile::{DriftReport, Reconciliation, reconcile};
use strata_solver::SolveError;
pub use workspace::{ResolveReport, Workspace, load_universe};

/// Errors surfaced by resolution.
///
/// Cheap to clone: one computation's failure is handed to every caller waiting on it.
#[derive(Clone, Debug, thiserror::Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    #[diagnostic(code(resolve::unresolved))]
    Unresolved(Arc<Unresolved>),
    #[error("{0}")]
    #[diagnostic(
        code(resolve::drift),
        help("rerun without --fail-on-changes to accept the calculated run bundles")
    )]
    Drift(Arc<DriftReport>),
    #[error("resolution was cancelled")]
    #[diagnostic(code(resolve::cancelled))]
    Cancelled,
    #[error("solver failed")]
    #[diagnostic(code(resolve::solver_failed))]
    Solver(#[source] Arc<SolveError>),
    #[error("failed to fetch repository `{location}`")]
    #[diagnostic(code(resolve::fetch_failed))]
    Fetch {
        location: String,
        #[source]
        source: Arc<strata_fetch::Error>,
    },
    #[error("invalid input: {0}")]
    #[diagnostic(code(resolve::invalid_input))]
    Model(#[source] Arc<strata_model::Error>),
}

/// Coarse classification of an [`Error`], e.g. for process exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Requirements could not be satisfied.
    Unresolved,
    /// Fail-on-changes was set and the calculated bundles differ from the persisted ones.
    Drift,
    Cancelled,
    /// I/O, fetch, parse or solver infrastructure failures.
    Environment,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unresolved(_) => ErrorKind::Unresolved,
            Error::Drift(_) => ErrorKind::Drift,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Solver(_) | Error::Fetch { .. } | Error::Model(_) => ErrorKind::Environment,
        }
    }
}

impl From<strata_model::Error> for Error {
    fn from(err: strata_model::Error) -> Self {
        Error::Model(Arc::new(err))
    }
}

#[cfg(test)]
pub(crate) mod testing;
