pub mod cache;
pub mod file;
pub mod http;
pub mod remote;

use std::{
    fmt,
    path::{Path, PathBuf},
};

pub use cache::ArtifactCache;
pub use file::FileSource;
pub use http::{HttpSource, HttpSourceOptions};
use miette::Diagnostic;
pub use remote::{RemoteSource, Source, SourceFuture};
use sha2::{Digest as _, Sha256};
use url::Url;

#[derive(Debug, thiserror::Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("unsupported URL scheme `{scheme}`")]
    #[diagnostic(code(fetch::unsupported_scheme))]
    UnsupportedScheme { scheme: String },
    #[error("cannot derive a cache location for `{url}`")]
    #[diagnostic(code(fetch::invalid_location))]
    InvalidLocation { url: Url },
    #[error("invalid sha256 checksum `{0}`")]
    #[diagnostic(
        code(fetch::invalid_checksum),
        help("checksums are 64 hexadecimal characters")
    )]
    InvalidChecksum(String),
    #[error("checksum mismatch for `{url}`: expected {expected}, got {actual}")]
    #[diagnostic(code(fetch::checksum_mismatch))]
    ChecksumMismatch {
        url: Url,
        expected: String,
        actual: String,
    },
    #[error("response body from `{url}` exceeds max size {max_bytes} bytes (got {size} bytes)")]
    #[diagnostic(code(fetch::response_too_large))]
    ResponseTooLarge {
        url: Url,
        size: u64,
        max_bytes: usize,
    },
    #[error("http error: {0}")]
    #[diagnostic(code(fetch::http_error))]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    #[diagnostic(code(fetch::io_error))]
    Io(#[from] std::io::Error),
}

/// Lowercase hex sha256 of `bytes`, the form stored in sidecar files.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// What to fetch: a URL and, optionally, the sha256 its bytes must hash to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coordinates {
    pub url: Url,
    pub checksum: Option<String>,
}

impl Coordinates {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// The supplied checksum in lowercase, after checking it is well-formed.
    fn expected_checksum(&self) -> Result<Option<String>, Error> {
        let Some(checksum) = &self.checksum else {
            return Ok(None);
        };
        let checksum = checksum.trim().to_ascii_lowercase();
        match hex::decode(&checksum) {
            Ok(bytes) if bytes.len() == 32 => Ok(Some(checksum)),
            _ => Err(Error::InvalidChecksum(checksum)),
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.checksum {
            Some(checksum) => write!(f, "{}#sha256={checksum}", self.url),
            None => fmt::Display::fmt(&self.url, f),
        }
    }
}

/// Fetches artifacts into a checksum-verified local cache.
#[derive(Clone, Debug)]
pub struct Fetcher {
    cache: ArtifactCache,
    pub file: FileSource,
    pub http: HttpSource,
    remotes: remote::RemoteDispatch,
}

impl Fetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            cache: ArtifactCache::new(root),
            file: FileSource::new(),
            http: HttpSource::new(),
            remotes: Default::default(),
        }
    }

    pub fn with_http_options(mut self, options: HttpSourceOptions) -> Self {
        self.http = HttpSource::with_options(options);
        self
    }

    pub fn with_remote(&self, source: RemoteSource) -> Self {
        Self {
            cache: self.cache.clone(),
            file: self.file,
            http: self.http.clone(),
            remotes: self.remotes.with_remote(source),
        }
    }

    pub fn root(&self) -> &Path {
        self.cache.root()
    }

    /// Make `coordinates` available locally and return the path of the cached copy.
    ///
    /// A cached copy whose sidecar matches the supplied checksum is returned without touching
    /// the source. When the source fails, a cached copy is used instead as long as it does not
    /// contradict the supplied checksum.
    pub async fn fetch(&self, coordinates: &Coordinates) -> Result<PathBuf, Error> {
        let url = &coordinates.url;
        let expected = coordinates.expected_checksum()?;
        let target = self.cache.path_for(url)?;

        if let Some(expected) = &expected
            && self.cache.checksum(&target).await?.as_ref() == Some(expected)
        {
            tracing::debug!(%url, path = %target.display(), "using cached artifact");
            return Ok(target);
        }

        let bytes = match self.download(url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Some(cached) = self.cache.checksum(&target).await?
                    && expected.as_ref().is_none_or(|expected| *expected == cached)
                {
                    tracing::warn!(%url, "fetch failed, using cached artifact: {err}");
                    return Ok(target);
                }
                return Err(err);
            }
        };

        let actual = sha256_hex(&bytes);
        if let Some(expected) = expected
            && expected != actual
        {
            return Err(Error::ChecksumMismatch {
                url: url.clone(),
                expected,
                actual,
            });
        }

        self.cache.store(&target, bytes, actual).await?;
        tracing::debug!(%url, path = %target.display(), "fetched artifact");
        Ok(target)
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, Error> {
        if let Some(source) = self.remotes.get(url.scheme()) {
            return source.fetch(url).await;
        }

        match url.scheme() {
            "file" => self.file.fetch(url).await,
            "http" | "https" => self.http.fetch(url).await,
            scheme => Err(Error::UnsupportedScheme {
                scheme: scheme.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
