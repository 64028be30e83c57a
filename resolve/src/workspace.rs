use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use futures::{FutureExt as _, future::BoxFuture};
use strata_fetch::{Coordinates, Fetcher};
use strata_model::{Fingerprint, LeveledBundle, Repository, RunDescriptor, RunSpec};
use strata_solver::{Solver, Universe};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    CacheEntry, Error, ResolutionCache, ResolutionOutcome, SolverAdapter, assign_levels,
    collect_requirements, order,
    reconcile::{Reconciliation, reconcile},
};

/// Entry point tying the resolution pipeline to a solver and a resolution cache.
#[derive(Clone)]
pub struct Workspace {
    adapter: SolverAdapter,
    cache: ResolutionCache,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// What an explicit [`Workspace::resolve`] produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveReport {
    pub fingerprint: Fingerprint,
    pub bundles: Arc<[LeveledBundle]>,
    pub computed_at: DateTime<Utc>,
    /// Whether the descriptor's persisted run bundles were replaced.
    pub changed: bool,
}

impl Workspace {
    pub fn new(solver: Arc<dyn Solver>) -> Self {
        Self {
            adapter: SolverAdapter::new(solver),
            cache: ResolutionCache::new(),
        }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Cache key for resolving `spec` against `universe`: the serialized spec plus the URL and
    /// index digest of every repository.
    pub fn fingerprint(spec: &RunSpec, universe: &Universe) -> Result<Fingerprint, Error> {
        Ok(Fingerprint::of(&(spec, universe.identity()))?)
    }

    /// The run bundles for `spec`, computed only when `force` is set or a computation for the
    /// same input is already running.
    pub async fn run_bundles(
        &self,
        spec: &RunSpec,
        universe: &Universe,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<CacheEntry>, Error> {
        let fingerprint = Self::fingerprint(spec, universe)?;
        self.cache
            .get_or_compute(fingerprint, force, cancel, self.computation(spec, universe))
            .await
    }

    fn computation(
        &self,
        spec: &RunSpec,
        universe: &Universe,
    ) -> impl FnOnce(CancellationToken) -> BoxFuture<'static, Result<Vec<LeveledBundle>, Error>>
    + use<> {
        let adapter = self.adapter.clone();
        let spec = spec.clone();
        let universe = universe.clone();
        move |token| {
            async move { compute_bundles(&adapter, &spec, &universe, &token).await }.boxed()
        }
    }

    /// Resolve `descriptor` and reconcile its persisted run bundles with the result.
    ///
    /// Unlike [`Workspace::run_bundles`], a cache miss is always computed. With
    /// `fail_on_changes`, differing bundles are reported as [`Error::Drift`] and the descriptor
    /// is left untouched.
    pub async fn resolve(
        &self,
        descriptor: &mut RunDescriptor,
        universe: &Universe,
        fail_on_changes: bool,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<ResolveReport, Error> {
        let fingerprint = Self::fingerprint(&descriptor.spec, universe)?;
        let entry = match self.cache.get(&fingerprint) {
            Some(entry) if !force => entry,
            _ => {
                let compute = self.computation(&descriptor.spec, universe);
                self.cache.compute(fingerprint, cancel, compute).await?
            }
        };

        let changed = match reconcile(&entry.bundles, &mut descriptor.run_bundles, fail_on_changes)
        {
            Reconciliation::Unchanged => false,
            Reconciliation::Changed => true,
            Reconciliation::Drift(report) => {
                tracing::warn!(%fingerprint, "run bundles drifted");
                return Err(Error::Drift(Arc::new(report)));
            }
        };
        tracing::info!(
            %fingerprint,
            bundles = entry.bundles.len(),
            changed,
            "resolved run bundles"
        );

        Ok(ResolveReport {
            fingerprint: entry.fingerprint,
            bundles: entry.bundles,
            computed_at: entry.computed_at,
            changed,
        })
    }
}

/// Collect, solve, order and level: the computation the resolution cache runs.
async fn compute_bundles(
    adapter: &SolverAdapter,
    spec: &RunSpec,
    universe: &Universe,
    cancel: &CancellationToken,
) -> Result<Vec<LeveledBundle>, Error> {
    let requirements = collect_requirements(spec);
    tracing::debug!(requirements = requirements.len(), "resolving run requirements");

    match adapter.resolve(&requirements, universe, cancel).await {
        ResolutionOutcome::Resolved(wiring) => {
            let start_levels = spec.start_levels.as_ref();
            let policy = start_levels.map(|config| config.order).unwrap_or_default();
            let ordered = order(&wiring, &requirements, policy);
            Ok(assign_levels(&ordered, start_levels))
        }
        ResolutionOutcome::Unresolved(unresolved) => Err(Error::Unresolved(Arc::new(unresolved))),
        ResolutionOutcome::Cancelled => Err(Error::Cancelled),
        ResolutionOutcome::Error(err) => Err(Error::Solver(Arc::new(err))),
    }
}

/// Fetch and parse every repository `spec` references, resolving relative locations against
/// `base` (typically the run descriptor's own URL).
pub async fn load_universe(
    spec: &RunSpec,
    base: &Url,
    fetcher: &Fetcher,
) -> Result<Universe, Error> {
    let mut repositories = Vec::with_capacity(spec.repositories.len());
    for reference in &spec.repositories {
        let url = reference.url(base)?;
        let fetch_error = |source: strata_fetch::Error| Error::Fetch {
            location: reference.location.clone(),
            source: Arc::new(source),
        };

        let mut coordinates = Coordinates::new(url.clone());
        coordinates.checksum = reference.checksum.clone();
        let path = fetcher.fetch(&coordinates).await.map_err(fetch_error)?;
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| fetch_error(err.into()))?;

        let repository = Repository::parse(url, &source)?;
        tracing::debug!(
            url = %repository.url(),
            digest = %repository.digest(),
            components = repository.components().len(),
            "loaded repository"
        );
        repositories.push(repository);
    }
    Ok(Universe::new(repositories))
}
