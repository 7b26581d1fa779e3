use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use std::path::Path;
use std::sync::Arc;

/// Fetches artifact bytes to a local path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Streams `url` into `dest`, truncating it first. Returns the byte count.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// [`Downloader`] over the retrying HTTP client, writing through a [`Runtime`].
pub struct HttpDownloader<R: Runtime> {
    runtime: Arc<R>,
    http: HttpClient,
}

impl<R: Runtime> HttpDownloader<R> {
    pub fn new(runtime: Arc<R>, http: HttpClient) -> Self {
        HttpDownloader { runtime, http }
    }
}

#[async_trait]
impl<R: Runtime> Downloader for HttpDownloader<R> {
    #[tracing::instrument(skip(self, dest))]
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!("Downloading {} to {:?}", url, dest);
        let bytes = self
            .http
            .download_file(url, || {
                self.runtime
                    .create_file(dest)
                    .with_context(|| format!("Failed to create {:?}", dest))
            })
            .await?;
        debug!("Wrote {} bytes to {:?}", bytes, dest);
        Ok(bytes)
    }
}
