use std::{fmt, future::Future, pin::Pin, sync::Arc};

use url::Url;

use super::Error;

pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, Error>> + Send + 'a>>;

/// A custom artifact source, registered for one or more URL schemes.
pub trait Source: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a Url) -> SourceFuture<'a>;
}

#[derive(Clone)]
pub struct RemoteSource {
    schemes: Arc<[Arc<str>]>,
    backend: Arc<dyn Source>,
}

impl fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSource")
            .field("schemes", &self.schemes)
            .finish_non_exhaustive()
    }
}

impl RemoteSource {
    pub fn new<I, S>(schemes: I, backend: Arc<dyn Source>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self {
            schemes: schemes.into_iter().map(Into::into).collect(),
            backend,
        }
    }

    pub fn schemes(&self) -> &[Arc<str>] {
        &self.schemes
    }

    pub fn fetch<'a>(&'a self, url: &'a Url) -> SourceFuture<'a> {
        self.backend.fetch(url)
    }
}

/// Dispatches fetches to custom sources by URL scheme.
#[derive(Clone, Debug, Default)]
pub(super) struct RemoteDispatch {
    sources: Vec<RemoteSource>,
}

impl RemoteDispatch {
    /// The most recently registered source for `scheme`.
    pub(super) fn get(&self, scheme: &str) -> Option<&RemoteSource> {
        self.sources
            .iter()
            .rev()
            .find(|source| source.schemes().iter().any(|s| &**s == scheme))
    }

    pub(super) fn with_remote(&self, source: RemoteSource) -> Self {
        let mut sources = self.sources.clone();
        sources.push(source);
        Self { sources }
    }
}
