//! Rate-limited, retried access to the NCBI E-utilities service.

mod client;
mod pacer;

pub use client::EutilsClient;
pub use pacer::RequestPacer;

use std::time::Duration;

use crate::models::InvalidPmid;

/// Errors from the retrieval layer.
///
/// Transient errors (timeouts, network trouble, 5xx, explicit rate limiting)
/// are retried by the client; permanent ones (bad identifier, not found,
/// other 4xx, unparseable responses) surface immediately.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The identifier failed format validation
    #[error(transparent)]
    InvalidPmid(#[from] InvalidPmid),

    /// No record exists for this identifier
    #[error("paper not found: {0}")]
    NotFound(String),

    /// Upstream signalled rate limiting (429), possibly with a Retry-After
    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<u64> },

    /// A single attempt exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// Upstream returned an unexpected HTTP status
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The response envelope could not be parsed
    #[error("parse error: {0}")]
    Parse(String),
}

impl RetrievalError {
    /// Whether the retry policy applies to this error.
    pub fn is_transient(&self) -> bool {
        match self {
            RetrievalError::RateLimited { .. }
            | RetrievalError::Timeout
            | RetrievalError::Network(_) => true,
            RetrievalError::Status(code) => *code >= 500,
            _ => false,
        }
    }

    /// Delay explicitly suggested by the server, when present. Overrides the
    /// backoff formula for that retry.
    pub fn server_suggested_delay(&self) -> Option<Duration> {
        match self {
            RetrievalError::RateLimited {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}
