use std::io;

use url::Url;

use super::Error;

#[derive(Clone, Copy, Debug, Default)]
pub struct FileSource;

impl FileSource {
    pub fn new() -> Self {
        Default::default()
    }

    pub(super) async fn fetch(&self, url: &Url) -> Result<Vec<u8>, Error> {
        let path = url.to_file_path().map_err(|()| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file URL: {url}"),
            )
        })?;
        Ok(tokio::fs::read(&path).await?)
    }
}
