use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::sync::OnceCell;
use url::Url;

use super::Error;

#[derive(Clone, Debug)]
pub struct HttpSource {
    client: Arc<OnceCell<reqwest::Client>>,
    options: HttpSourceOptions,
}

impl HttpSource {
    pub fn new() -> Self {
        Self::with_options(HttpSourceOptions::default())
    }

    pub fn with_options(options: HttpSourceOptions) -> Self {
        Self {
            client: Arc::new(OnceCell::new()),
            options,
        }
    }

    pub fn options(&self) -> &HttpSourceOptions {
        &self.options
    }

    async fn client(&self) -> Result<&reqwest::Client, Error> {
        self.client
            .get_or_try_init(|| async {
                let mut builder = reqwest::Client::builder()
                    .connect_timeout(self.options.connect_timeout)
                    .timeout(self.options.request_timeout);
                if let Some(read_timeout) = self.options.read_timeout {
                    builder = builder.read_timeout(read_timeout);
                }
                builder.build()
            })
            .await
            .map_err(Error::from)
    }

    pub(super) async fn fetch(&self, url: &Url) -> Result<Vec<u8>, Error> {
        let res = self
            .client()
            .await?
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        let resolved_url = res.url().clone();

        let max_body_bytes = self.options.max_body_bytes;
        if let Some(content_length) = res.content_length()
            && content_length > max_body_bytes as u64
        {
            return Err(Error::ResponseTooLarge {
                url: resolved_url,
                size: content_length,
                max_bytes: max_body_bytes,
            });
        }

        let mut body = Vec::new();
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > max_body_bytes {
                return Err(Error::ResponseTooLarge {
                    url: resolved_url,
                    size: (body.len() + chunk.len()) as u64,
                    max_bytes: max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HttpSourceOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub read_timeout: Option<Duration>,
    pub max_body_bytes: usize,
}

impl Default for HttpSourceOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
            read_timeout: Some(Duration::from_secs(30)),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}
