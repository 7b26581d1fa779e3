//! HTTP client module with retry logic and error handling.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{
    MAX_RETRIES, MAX_RETRY_DELAY_MS, NonRetryableError, RETRY_DELAY_MS, backoff_delay,
    check_retryable, classify_error,
};
