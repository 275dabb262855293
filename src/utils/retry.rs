//! Retry with exponential backoff for E-utilities calls.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::retrieval::RetrievalError;

/// Configuration for retry behavior.
///
/// The delay before retry number `n` (counting from 0) is
/// `base_delay * backoff_factor^n`, clamped to `max_delay`. The initial
/// attempt is never delayed. A rate-limit response carrying a server-suggested
/// delay overrides the formula for that retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied per retry
    pub backoff_factor: f64,
    /// Ceiling for any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Backoff delay for the given retry index (0 = first retry).
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt_index as i32);
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }
}

/// Execute an async operation, retrying transient failures.
///
/// Permanent errors are returned immediately; transient ones are retried up
/// to `config.max_attempts` total attempts.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, RetrievalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetrievalError>>,
{
    let mut retries: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::debug!(attempts = retries + 1, "request succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && retries + 1 < config.max_attempts => {
                let delay = err
                    .server_suggested_delay()
                    .unwrap_or_else(|| config.backoff_delay(retries));
                tracing::debug!(
                    attempt = retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(delay).await;
                retries += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::warn!(attempts = retries + 1, error = %err, "retries exhausted");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(8),
        }
    }

    #[test]
    fn test_backoff_sequence_clamped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        };
        let delays: Vec<u64> = (0..6).map(|i| config.backoff_delay(i).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = with_retry(&fast_config(), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RetrievalError>("ok")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = with_retry(&fast_config(), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RetrievalError::Network("flaky".into()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = with_retry(&fast_config(), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RetrievalError::NotFound("99999".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(RetrievalError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_suggested_delay_overrides_backoff() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        };
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let before = tokio::time::Instant::now();
        let result = with_retry(&config, || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RetrievalError::RateLimited {
                        retry_after: Some(5),
                    })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // The 5 s server hint replaces the 1 s backoff formula entirely.
        assert_eq!(before.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_transient_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = with_retry(&fast_config(), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RetrievalError::Status(503))
            }
        })
        .await;
        assert!(matches!(result, Err(RetrievalError::Status(503))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
