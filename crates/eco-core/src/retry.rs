//! Retry logic for connection-level BLE operations.
//!
//! The command queue itself never retries: a failed command is reported and
//! dropped. Retries belong to the steps around it, such as connecting or
//! writing the PIN, where repeating the whole operation is safe.
//!
//! # Example
//!
//! ```
//! use eco_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::new(3);
//!
//! let value = with_retry(&config, "connect", || async {
//!     Ok::<_, Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries).
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries (for exponential backoff).
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = constant delay, 2.0 = double each time).
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retry configuration for establishing a connection.
    ///
    /// Valves spend most of their time asleep and can take a few seconds
    /// to accept a connection, so delays are long.
    pub fn for_connect() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Up to 25% jitter.
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Execute an async operation with retry logic.
///
/// Only transport errors are retried. Authentication, usage and decoding
/// errors are returned after the first attempt.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < config.max_retries {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}",
                        operation_name,
                        attempt + 1,
                        config.max_retries + 1,
                        delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| Error::InvalidData("Operation failed with no error".to_string())))
}

/// Whether repeating the operation might succeed.
fn is_retryable(error: &Error) -> bool {
    match error {
        // Repeating a lookup or discovery gives the same answer.
        Error::DeviceNotFound(_) | Error::CharacteristicNotFound { .. } => false,
        other => other.kind() == ErrorKind::Transport,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig::new(max_retries)
            .initial_delay(Duration::from_millis(1))
            .jitter(false)
    }

    #[test]
    fn test_retry_config_presets() {
        assert_eq!(RetryConfig::default().max_retries, 3);
        assert!(RetryConfig::default().jitter);
        assert_eq!(RetryConfig::none().max_retries, 0);
        assert_eq!(
            RetryConfig::for_connect().initial_delay,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::new(5)
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(300))
            .jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_bounded() {
        let config = RetryConfig::new(1).initial_delay(Duration::from_millis(100));
        for _ in 0..32 {
            let delay = config.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&Error::timeout("connect", Duration::from_secs(1))));
        assert!(is_retryable(&Error::NotConnected));
        assert!(is_retryable(&Error::ConnectionLost));
        assert!(!is_retryable(&Error::MissingKey));
        assert!(!is_retryable(&Error::InvalidData("short".to_string())));
        assert!(!is_retryable(&Error::device_not_found("eTRV")));
        assert!(!is_retryable(&Error::characteristic_not_found("2a19")));
    }

    #[tokio::test]
    async fn test_with_retry_eventual_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<i32> = with_retry(&fast(3), "test", || {
            let attempts = Arc::clone(&counter);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::NotConnected)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_all_fail() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<i32> = with_retry(&fast(2), "test", || {
            let attempts = Arc::clone(&counter);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::ConnectionLost)
            }
        })
        .await;

        assert!(matches!(result, Err(Error::ConnectionLost)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<i32> = with_retry(&fast(5), "test", || {
            let attempts = Arc::clone(&counter);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::MissingKey)
            }
        })
        .await;

        assert!(matches!(result, Err(Error::MissingKey)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
