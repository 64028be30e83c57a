use std::{
    ffi::OsString,
    io::{self, Write as _},
    path::{Path, PathBuf},
    sync::Arc,
};

use url::{Url, form_urlencoded};

use super::Error;

const SIDECAR_EXTENSION: &str = "sha256";

/// On-disk artifact cache.
///
/// Layout: `<root>/<url-encoded parent URL>/<file name>`, with the lowercase hex sha256 of the
/// artifact in a `<file name>.sha256` sidecar next to it.
#[derive(Clone, Debug)]
pub struct ArtifactCache {
    root: Arc<Path>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into().into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, url: &Url) -> Result<PathBuf, Error> {
        let invalid = || Error::InvalidLocation { url: url.clone() };
        let mut segments = url.path_segments().ok_or_else(invalid)?;
        let file = segments
            .next_back()
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .ok_or_else(invalid)?;

        let mut parent = url.clone();
        parent.set_query(None);
        parent.set_fragment(None);
        parent
            .path_segments_mut()
            .map_err(|()| invalid())?
            .pop();
        let dir: String = form_urlencoded::byte_serialize(parent.as_str().as_bytes()).collect();

        Ok(self.root.join(dir).join(file))
    }

    /// The recorded checksum of a cached artifact, if both the artifact and its sidecar exist.
    pub async fn checksum(&self, path: &Path) -> Result<Option<String>, Error> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        match tokio::fs::read_to_string(sidecar_path(path)).await {
            Ok(contents) => Ok(Some(contents.trim().to_ascii_lowercase())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the artifact at `path` and its sidecar, each through a temp file and a rename.
    pub async fn store(&self, path: &Path, bytes: Vec<u8>, checksum: String) -> Result<(), Error> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let dir = path
                .parent()
                .ok_or_else(|| io::Error::other("cache path has no parent directory"))?;
            std::fs::create_dir_all(dir)?;
            replace(dir, &path, &bytes)?;
            replace(dir, &sidecar_path(&path), checksum.as_bytes())
        })
        .await
        .map_err(io::Error::other)??;
        Ok(())
    }
}

fn replace(dir: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = tempfile::Builder::new().prefix(".fetch-").tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

pub(crate) fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}
