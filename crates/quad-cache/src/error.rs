//! Upstream error taxonomy.

use thiserror::Error;

/// Errors produced by upstream fetches.
///
/// Values are cloneable so a single-flight fetch can hand the same error to
/// every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// Network-level failure (connect, DNS, connection reset).
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// Deadline exceeded, either the HTTP client's or the cache store's.
    #[error("upstream deadline exceeded: {0}")]
    Timeout(String),

    /// Upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    /// Response body did not match the expected shape.
    #[error("invalid upstream payload: {0}")]
    InvalidPayload(String),

    /// The upstream affirmatively knows nothing about the key.
    #[error("{0} not found")]
    NotFound(String),
}

impl UpstreamError {
    /// Check if this error is transient and worth retrying.
    ///
    /// Not-found and malformed-payload errors are definitive; retrying them
    /// only repeats the same answer.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Unavailable(_) | UpstreamError::Timeout(_) => true,
            UpstreamError::Status { status } => *status >= 500 || *status == 429,
            UpstreamError::InvalidPayload(_) | UpstreamError::NotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            UpstreamError::Status {
                status: status.as_u16(),
            }
        } else {
            UpstreamError::Unavailable(err.to_string())
        }
    }
}
