//! Retry policy for transfer operations.
//!
//! Transient failures (connection resets, timeouts, 5xx) are retried a
//! bounded number of times; anything that cannot succeed on a second
//! attempt is classified as [`NonRetryableError`] and surfaced immediately.

use reqwest::StatusCode;

/// Maximum number of attempts for a transfer operation.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Transfer errors that will not succeed on retry.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 401: the source requires credentials this crate does not hold.
    AuthenticationRequired(String),
    /// HTTP 403: access denied.
    Forbidden(String),
    /// HTTP 404: the artifact is gone or the declaration is stale.
    NotFound(String),
    /// HTTP 429: the source is throttling us.
    RateLimited(String),
    /// Any other 4xx.
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::AuthenticationRequired(msg) => {
                write!(f, "Authentication required: {msg}")
            }
            NonRetryableError::Forbidden(msg) => write!(f, "Access forbidden: {msg}"),
            NonRetryableError::NotFound(msg) => write!(f, "Not found: {msg}"),
            NonRetryableError::RateLimited(msg) => {
                write!(f, "Rate limited: {msg}. Try again later.")
            }
            NonRetryableError::ClientError(msg) => write!(f, "Request error: {msg}"),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Classify a transfer error. `Ok(())` means the error is worth retrying.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        // Connection failures and timeouts are retryable.
        return Ok(());
    };

    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationRequired(
            "the remote rejected the request".to_string(),
        )),
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(
            "the remote denied access to this resource".to_string(),
        )),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(
            "the requested resource does not exist".to_string(),
        )),
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimited(
            "the remote is throttling requests".to_string(),
        )),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} error",
            s.as_u16()
        ))),
        // 5xx and everything else: retryable.
        _ => Ok(()),
    }
}

/// Wrap an `error_for_status()` failure, replacing it with a
/// [`NonRetryableError`] when retrying would be pointless.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}

/// Whether an error is worth another attempt.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.downcast_ref::<NonRetryableError>().is_none()
}
