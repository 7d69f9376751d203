//! Retry with exponential backoff
//!
//! Used when opening the browser session: chromedriver is often launched
//! alongside the tool and may not accept connections for the first second
//! or two.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff duration for a given attempt
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()))
    }
}

/// Retry classification for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Trait for errors that can indicate whether to retry
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;
}

/// Execute an async operation with retry logic
///
/// Returns the first success, or the last error once retries are exhausted
/// or a non-retryable error is seen.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if e.retry_decision() == RetryDecision::NoRetry {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation failed with non-retryable error: {}",
                        e
                    );
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "Operation failed after {} attempts: {}",
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying after error: {}",
                    e
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_duration() {
        let config = RetryConfig {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            ..Default::default()
        };

        assert_eq!(config.backoff_duration(0), Duration::from_secs(1));
        assert_eq!(config.backoff_duration(1), Duration::from_secs(2));
        assert_eq!(config.backoff_duration(3), Duration::from_secs(8));
        assert_eq!(config.backoff_duration(5), Duration::from_secs(10)); // Capped
    }

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError(retryable={})", self.retryable)
        }
    }

    impl RetryableError for TestError {
        fn retry_decision(&self) -> RetryDecision {
            if self.retryable {
                RetryDecision::Retry
            } else {
                RetryDecision::NoRetry
            }
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let mut attempts = 0;

        let result: Result<&str, TestError> = with_retry(&fast(), "test", || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Err(TestError { retryable: true })
                } else {
                    Ok("session")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "session");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let mut attempts = 0;

        let result: Result<(), TestError> = with_retry(&fast(), "test", || {
            attempts += 1;
            async move { Err(TestError { retryable: true }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3); // Initial + 2 retries
    }

    #[tokio::test]
    async fn test_no_retry_on_permanent_error() {
        let mut attempts = 0;

        let result: Result<(), TestError> = with_retry(&fast(), "test", || {
            attempts += 1;
            async move { Err(TestError { retryable: false }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
