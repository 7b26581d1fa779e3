//! Retry policy for registry requests and downloads.

use std::time::Duration;

use reqwest::StatusCode;

/// Maximum number of attempts for one network operation.
pub const MAX_RETRIES: usize = 4;

/// Base delay before the first retry, in milliseconds.
pub const RETRY_DELAY_MS: u64 = 500;

/// Upper bound for a single backoff delay, in milliseconds.
pub const MAX_RETRY_DELAY_MS: u64 = 8_000;

/// Errors that should not be retried.
#[derive(Debug)]
pub enum NonRetryableError {
    /// Authentication failed (HTTP 401)
    AuthenticationFailed(String),
    /// Resource not found (HTTP 404)
    NotFound(String),
    /// Forbidden access (HTTP 403)
    Forbidden(String),
    /// Other client errors that won't succeed on retry
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::AuthenticationFailed(msg) => {
                write!(f, "Authentication failed: {}. Check your MODRINTH_TOKEN.", msg)
            }
            NonRetryableError::NotFound(msg) => write!(f, "Not found: {}", msg),
            NonRetryableError::Forbidden(msg) => write!(f, "Access forbidden: {}", msg),
            NonRetryableError::ClientError(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Classifies a status error as retryable or non-retryable.
///
/// 408, 413, 429 and every 5xx are retried, as are errors without a status
/// (connection resets, timeouts, DNS).
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        return Ok(());
    };

    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(
            "Invalid or missing authentication token".to_string(),
        )),
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(
            "Access to this resource is forbidden".to_string(),
        )),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(
            "The requested resource was not found".to_string(),
        )),
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::TOO_MANY_REQUESTS => Ok(()),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} error",
            s.as_u16()
        ))),
        _ => Ok(()),
    }
}

/// Maps an error from `error_for_status()` to either itself (retryable) or a
/// `NonRetryableError`.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}

/// Exponential backoff: base delay doubled per failed attempt, capped.
///
/// `attempt` is 1-based: the delay after the first failure is the base delay.
pub fn backoff_delay(attempt: usize, base_ms: u64) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    let delay = base_ms.saturating_mul(1u64 << shift);
    Duration::from_millis(delay.min(MAX_RETRY_DELAY_MS))
}
