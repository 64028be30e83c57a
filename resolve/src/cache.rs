use std::{
    fmt,
    future::Future,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt as _,
    future::{BoxFuture, Shared, WeakShared},
};
use strata_model::{Fingerprint, LeveledBundle};
use tokio_util::sync::CancellationToken;

use crate::Error;

/// A computed run bundle list and the fingerprint of the input it was computed from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub bundles: Arc<[LeveledBundle]>,
    pub computed_at: DateTime<Utc>,
}

type Computation = BoxFuture<'static, Result<CacheEntry, Error>>;

struct Flight {
    id: u64,
    computation: WeakShared<Computation>,
}

/// Run bundle lists keyed by input fingerprint, with at most one computation in flight per key.
///
/// Every caller interested in a fingerprint awaits the same shared computation. A caller that
/// gives up (its token fires) only stops waiting; the computation is dropped, and the token it
/// was handed cancelled, once nobody is waiting any more. Only successful results are stored.
#[derive(Clone, Default)]
pub struct ResolutionCache {
    inner: Arc<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: DashMap<Fingerprint, CacheEntry>,
    in_flight: DashMap<Fingerprint, Flight>,
    next_flight: AtomicU64,
}

impl fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("entries", &self.inner.entries.len())
            .field("in_flight", &self.inner.in_flight.len())
            .finish()
    }
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.inner
            .entries
            .get(fingerprint)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drop every stored entry. Computations already in flight still store their result.
    pub fn clear(&self) {
        self.inner.entries.clear();
        tracing::debug!("resolution cache cleared");
    }

    /// Look up `fingerprint`, computing it when asked to.
    ///
    /// - without `force`, a stored entry is returned as is; with nothing stored and nothing in
    ///   flight the result is `Ok(None)` and `compute` is not invoked;
    /// - with `force`, the entry is recomputed and overwritten;
    /// - either way, a computation already in flight for `fingerprint` is joined rather than
    ///   started again.
    ///
    /// `compute` receives the token the computation should observe. It is cancelled only when
    /// every caller has stopped waiting.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        force: bool,
        cancel: &CancellationToken,
        compute: F,
    ) -> Result<Option<CacheEntry>, Error>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<Vec<LeveledBundle>, Error>> + Send + 'static,
    {
        if force {
            return self.compute(fingerprint, cancel, compute).await.map(Some);
        }
        if let Some(entry) = self.get(&fingerprint) {
            tracing::debug!(%fingerprint, "resolution cache hit");
            return Ok(Some(entry));
        }
        if let Some(computation) = self.join(&fingerprint) {
            return wait(computation, cancel).await.map(Some);
        }
        // A flight may have finished between the two lookups; it stores before retiring.
        let entry = self.get(&fingerprint);
        if entry.is_none() {
            tracing::debug!(%fingerprint, "resolution cache miss");
        }
        Ok(entry)
    }

    /// Compute `fingerprint` and overwrite its entry, joining a computation already in flight.
    pub async fn compute<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        cancel: &CancellationToken,
        compute: F,
    ) -> Result<CacheEntry, Error>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<Vec<LeveledBundle>, Error>> + Send + 'static,
    {
        let computation = match self.inner.in_flight.entry(fingerprint) {
            Entry::Occupied(mut occupied) => match occupied.get().computation.upgrade() {
                Some(computation) => {
                    tracing::debug!(%fingerprint, "joining resolution in flight");
                    computation
                }
                None => {
                    let (flight, computation) = self.start(fingerprint, compute);
                    occupied.insert(flight);
                    computation
                }
            },
            Entry::Vacant(vacant) => {
                let (flight, computation) = self.start(fingerprint, compute);
                vacant.insert(flight);
                computation
            }
        };
        wait(computation, cancel).await
    }

    /// The live computation for `fingerprint`, if any.
    fn join(&self, fingerprint: &Fingerprint) -> Option<Shared<Computation>> {
        let computation = self.inner.in_flight.get(fingerprint)?.computation.upgrade()?;
        tracing::debug!(%fingerprint, "joining resolution in flight");
        Some(computation)
    }

    /// Number of computations currently registered as in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    fn start<F, Fut>(&self, fingerprint: Fingerprint, compute: F) -> (Flight, Shared<Computation>)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<Vec<LeveledBundle>, Error>> + Send + 'static,
    {
        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        let work = compute(token);
        let retire = Retire {
            cache: Arc::downgrade(&self.inner),
            fingerprint,
            id,
        };

        tracing::debug!(%fingerprint, flight = id, "starting resolution");
        let computation: Computation = async move {
            let result = work.await;
            let _ = guard.disarm();
            retire.finish(result)
        }
        .boxed();
        let computation = computation.shared();

        let flight = Flight {
            id,
            computation: computation
                .downgrade()
                .expect("fresh shared future has not completed"),
        };
        (flight, computation)
    }
}

async fn wait(
    computation: Shared<Computation>,
    cancel: &CancellationToken,
) -> Result<CacheEntry, Error> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = computation => result,
    }
}

/// Removes its flight from `in_flight` when dropped, whether the computation completed or was
/// abandoned by its last waiter.
struct Retire {
    cache: Weak<CacheInner>,
    fingerprint: Fingerprint,
    id: u64,
}

impl Retire {
    fn finish(self, result: Result<Vec<LeveledBundle>, Error>) -> Result<CacheEntry, Error> {
        let fingerprint = self.fingerprint;
        let result = result.map(|bundles| CacheEntry {
            fingerprint,
            bundles: bundles.into(),
            computed_at: Utc::now(),
        });

        match &result {
            Ok(entry) => {
                tracing::debug!(%fingerprint, bundles = entry.bundles.len(), "resolution stored");
                if let Some(cache) = self.cache.upgrade() {
                    cache.entries.insert(fingerprint, entry.clone());
                }
            }
            Err(err) => tracing::debug!(%fingerprint, "resolution failed: {err}"),
        }
        // Dropping `self` retires the flight, after the entry is stored.
        result
    }
}

impl Drop for Retire {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache
                .in_flight
                .remove_if(&self.fingerprint, |_, flight| flight.id == self.id);
        }
    }
}
