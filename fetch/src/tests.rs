use std::{
    io::Write as _,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use url::Url;

use super::*;
use crate::cache::sidecar_path;

/// Serves whatever bytes are currently set, or fails when unset, counting every request.
#[derive(Default)]
struct CountingSource {
    body: Mutex<Option<Vec<u8>>>,
    calls: AtomicUsize,
}

impl CountingSource {
    fn serve(&self, body: &str) {
        *self.body.lock().unwrap() = Some(body.as_bytes().to_vec());
    }

    fn go_down(&self) {
        *self.body.lock().unwrap() = None;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Source for CountingSource {
    fn fetch<'a>(&'a self, _url: &'a Url) -> SourceFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.body.lock().unwrap().clone();
        Box::pin(async move {
            body.ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "source is down",
                ))
            })
        })
    }
}

fn counting_fetcher(root: &Path) -> (Fetcher, Arc<CountingSource>) {
    let source = Arc::new(CountingSource::default());
    let fetcher = Fetcher::new(root).with_remote(RemoteSource::new(
        ["count"],
        Arc::clone(&source) as Arc<dyn Source>,
    ));
    (fetcher, source)
}

fn url() -> Url {
    Url::parse("count://repo/index.json5").unwrap()
}

#[tokio::test]
async fn checksum_mismatch_leaves_cache_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, source) = counting_fetcher(dir.path());
    source.serve("original");

    let expected = sha256_hex(b"something else");
    let err = fetcher
        .fetch(&Coordinates::new(url()).with_checksum(expected.clone()))
        .await
        .unwrap_err();

    let Error::ChecksumMismatch {
        expected: reported,
        actual,
        ..
    } = err
    else {
        panic!("expected ChecksumMismatch");
    };
    assert_eq!(reported, expected);
    assert_eq!(actual, sha256_hex(b"original"));
    let target = fetcher.cache.path_for(&url()).unwrap();
    assert!(!target.exists());
}

#[tokio::test]
async fn checksum_comparison_ignores_case() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, source) = counting_fetcher(dir.path());
    source.serve("original");

    let upper = sha256_hex(b"original").to_ascii_uppercase();
    let path = fetcher
        .fetch(&Coordinates::new(url()).with_checksum(upper))
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    assert_eq!(
        std::fs::read_to_string(sidecar_path(&path)).unwrap(),
        sha256_hex(b"original")
    );
}

#[tokio::test]
async fn missing_checksum_accepts_any_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, source) = counting_fetcher(dir.path());
    source.serve("first");

    let path = fetcher.fetch(&Coordinates::new(url())).await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");

    // Without a checksum there is nothing to validate a cached copy against, so refetch.
    source.serve("second");
    let path = fetcher.fetch(&Coordinates::new(url())).await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn matching_cached_copy_skips_source() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, source) = counting_fetcher(dir.path());
    source.serve("original");
    let coordinates = Coordinates::new(url()).with_checksum(sha256_hex(b"original"));

    let first = fetcher.fetch(&coordinates).await.unwrap();
    let second = fetcher.fetch(&coordinates).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn uses_cached_copy_when_source_is_down() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, source) = counting_fetcher(dir.path());
    source.serve("original");
    let path = fetcher.fetch(&Coordinates::new(url())).await.unwrap();

    source.go_down();
    let again = fetcher.fetch(&Coordinates::new(url())).await.unwrap();
    assert_eq!(again, path);
    assert_eq!(std::fs::read_to_string(&again).unwrap(), "original");

    // A cached copy that contradicts the requested checksum is not a substitute.
    let err = fetcher
        .fetch(&Coordinates::new(url()).with_checksum(sha256_hex(b"newer")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[tokio::test]
async fn replaces_stale_cached_copy() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, source) = counting_fetcher(dir.path());
    source.serve("original");
    fetcher
        .fetch(&Coordinates::new(url()).with_checksum(sha256_hex(b"original")))
        .await
        .unwrap();

    source.serve("updated");
    let path = fetcher
        .fetch(&Coordinates::new(url()).with_checksum(sha256_hex(b"updated")))
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "updated");
    assert_eq!(
        std::fs::read_to_string(sidecar_path(&path)).unwrap(),
        sha256_hex(b"updated")
    );
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn malformed_checksum_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, source) = counting_fetcher(dir.path());
    source.serve("original");

    let err = fetcher
        .fetch(&Coordinates::new(url()).with_checksum("abc"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidChecksum(_)));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn reads_file_urls() {
    let mut file = tempfile::Builder::new()
        .prefix("fetch-")
        .suffix(".json5")
        .tempfile()
        .unwrap();
    file.write_all(b"{ components: [] }").unwrap();
    file.flush().unwrap();
    let url = Url::from_file_path(file.path()).unwrap();

    let cache = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(cache.path());
    let path = fetcher.fetch(&Coordinates::new(url)).await.unwrap();

    assert!(path.starts_with(cache.path()));
    assert_eq!(std::fs::read(&path).unwrap(), b"{ components: [] }");
}

#[tokio::test]
async fn unknown_scheme_is_rejected() {
    let cache = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(cache.path());
    let err = fetcher
        .fetch(&Coordinates::new(Url::parse("ftp://host/index.json5").unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedScheme { scheme } if scheme == "ftp"));
}
