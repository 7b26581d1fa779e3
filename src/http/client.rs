use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::io::Write;
use std::time::Duration;

use super::retry::{MAX_RETRIES, MAX_RETRY_DELAY_MS, NonRetryableError, RETRY_DELAY_MS, backoff_delay, check_retryable};

/// Modrinth reports the seconds left in the current rate-limit window here.
const RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// A 429 from the registry. Retried after the advertised reset.
#[derive(Debug)]
struct RateLimited {
    url: String,
    reset_secs: Option<u64>,
}

impl std::fmt::Display for RateLimited {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rate limited by {}", self.url)
    }
}

impl std::error::Error for RateLimited {}

/// reqwest client that retries transient failures with backoff.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry_delay_ms: u64,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry_delay_ms: RETRY_DELAY_MS,
        }
    }

    /// Base backoff delay. Tests set 0.
    pub fn with_retry_delay(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_query(url, &[]).await
    }

    #[tracing::instrument(skip(self, query))]
    pub async fn get_json_with_query<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!("GET {} {:?}", url, query);
        self.retrying(url, || async {
            self.send(url, query)
                .await?
                .json::<T>()
                .await
                .with_context(|| format!("Unexpected response from {}", url))
        })
        .await
    }

    /// Streams `url` into the writer returned by `create_writer`.
    ///
    /// The writer is created only once the server has answered, and afresh on
    /// every attempt, so a retry never appends to a partial file.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        self.retrying(url, || async {
            let mut response = self.send(url, &[]).await?;
            let mut writer = create_writer()?;
            let mut written: u64 = 0;
            while let Some(chunk) = response
                .chunk()
                .await
                .with_context(|| format!("Connection lost while downloading {}", url))?
            {
                writer.write_all(&chunk).context("Failed to write downloaded data")?;
                written += chunk.len() as u64;
            }
            writer.flush().context("Failed to write downloaded data")?;
            debug!("Downloaded {} bytes from {}", written, url);
            Ok(written)
        })
        .await
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let reset_secs = response
                .headers()
                .get(RATELIMIT_RESET)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(RateLimited {
                url: url.to_string(),
                reset_secs,
            }
            .into());
        }
        response.error_for_status().map_err(check_retryable)
    }

    /// Runs `operation` up to [`MAX_RETRIES`] times. A [`NonRetryableError`]
    /// is returned at once.
    async fn retrying<F, Fut, T>(&self, url: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if err.downcast_ref::<NonRetryableError>().is_some() || attempt >= MAX_RETRIES {
                return Err(err);
            }

            let delay = self.delay_after(attempt, &err);
            warn!(
                "{}: attempt {}/{} failed ({:#}), retrying in {}ms",
                url,
                attempt,
                MAX_RETRIES,
                err,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn delay_after(&self, attempt: usize, err: &anyhow::Error) -> Duration {
        let backoff = backoff_delay(attempt, self.retry_delay_ms);
        match err.downcast_ref::<RateLimited>() {
            // A zero base delay disables waiting altogether.
            Some(RateLimited {
                reset_secs: Some(secs), ..
            }) if self.retry_delay_ms > 0 => {
                Duration::from_secs(*secs).clamp(backoff, Duration::from_millis(MAX_RETRY_DELAY_MS))
            }
            _ => backoff,
        }
    }
}
