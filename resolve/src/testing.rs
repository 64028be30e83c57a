use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use semver::Version;
use strata_model::{Capability, Component, Filter, Repository, Requirement};
use strata_solver::{IndexSolver, SolveError, SolveFuture, Solver, Universe};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// `name` 1.0.0, providing and requiring `service` capabilities keyed by `objectClass`.
pub(crate) fn component(name: &str, provides: &[&str], requires: &[&str]) -> Component {
    let mut raw = Component::builder(name, Version::new(1, 0, 0));
    for service in provides {
        raw = raw.capability(Capability::new("service").with_attribute("objectClass", *service));
    }
    for service in requires {
        raw = raw.requirement(Requirement::new(
            "service",
            Filter::equal("objectClass", *service),
        ));
    }
    raw.validate().unwrap()
}

pub(crate) fn universe(components: Vec<Component>) -> Universe {
    let url = Url::parse("memory://test/index").unwrap();
    Universe::new([Repository::from_components(url, components).unwrap()])
}

/// Solver double around [`IndexSolver`] that counts calls, can hold every call until released,
/// and remembers the token it was last handed.
pub(crate) struct TestSolver {
    calls: AtomicUsize,
    dropped: AtomicUsize,
    started: Notify,
    gate: Option<CancellationToken>,
    failure: Option<String>,
    token: Mutex<Option<CancellationToken>>,
}

impl TestSolver {
    fn with(gate: Option<CancellationToken>, failure: Option<String>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            started: Notify::new(),
            gate,
            failure,
            token: Mutex::new(None),
        }
    }

    pub(crate) fn index() -> Self {
        Self::with(None, None)
    }

    /// Every call waits for [`TestSolver::release`] before solving.
    pub(crate) fn gated() -> Self {
        Self::with(Some(CancellationToken::new()), None)
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self::with(None, Some(message.to_string()))
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.cancel();
        }
    }

    pub(crate) async fn started(&self) {
        self.started.notified().await;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls whose future was dropped before finishing.
    pub(crate) fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub(crate) fn last_token(&self) -> Option<CancellationToken> {
        self.token.lock().unwrap().clone()
    }
}

struct DropCounter<'a> {
    count: &'a AtomicUsize,
    armed: bool,
}

impl Drop for DropCounter<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Solver for TestSolver {
    fn solve<'a>(
        &'a self,
        requirements: &'a [Requirement],
        universe: &'a Universe,
        cancel: &'a CancellationToken,
    ) -> SolveFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.token.lock().unwrap() = Some(cancel.clone());
            let mut guard = DropCounter {
                count: &self.dropped,
                armed: true,
            };
            self.started.notify_one();

            if let Some(gate) = &self.gate {
                gate.cancelled().await;
            }
            let result = match &self.failure {
                Some(message) => Err(SolveError::Failed(message.clone().into())),
                None => IndexSolver.solve(requirements, universe, cancel).await,
            };
            guard.armed = false;
            result
        })
    }
}
