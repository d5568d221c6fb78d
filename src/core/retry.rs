//! Retry utilities for transient writer failures.

use crate::core::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff)
    pub multiplier: f64,
    /// Add jitter to spread out concurrent writers
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff with the given number of retries
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Default::default()
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        let next = Duration::from_secs_f64(current.as_secs_f64() * self.multiplier);
        next.min(self.max_backoff)
    }
}

/// Execute an operation, retrying recoverable errors
pub async fn retry_with_config<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut backoff = config.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !error.is_recoverable() || attempt > config.retries {
                    return Err(error);
                }

                let actual_backoff = if config.jitter {
                    let jitter_ms = rand::random::<f64>() * backoff.as_millis() as f64 * 0.1;
                    backoff + Duration::from_millis(jitter_ms as u64)
                } else {
                    backoff
                };

                tracing::warn!(
                    attempt,
                    category = error.category(),
                    "write attempt failed: {}. Retrying in {:?}",
                    error,
                    actual_backoff
                );

                sleep(actual_backoff).await;
                backoff = config.next_backoff(backoff);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MonitorError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn io_error() -> MonitorError {
        MonitorError::Io(std::io::Error::new(std::io::ErrorKind::Other, "transient"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = &AtomicU32::new(0);
        let config = RetryConfig::with_retries(3);

        let result = retry_with_config(&config, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(io_error())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retries() {
        let calls = &AtomicU32::new(0);
        let config = RetryConfig::with_retries(2);

        let result: Result<()> = retry_with_config(&config, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(io_error())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_recoverable_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let config = RetryConfig::with_retries(5);

        let result: Result<()> = retry_with_config(&config, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MonitorError::config("bad"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_backoff: Duration::from_millis(300),
            ..RetryConfig::with_retries(4)
        };
        let next = config.next_backoff(Duration::from_millis(200));
        assert_eq!(next, Duration::from_millis(300));
    }
}
