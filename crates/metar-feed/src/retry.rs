//! Bounded retry for feed retrieval.
//!
//! Every failure counts the same: a timeout, a refused connection, an error
//! status, a truncated body and an unparseable response all use up one
//! attempt. By default attempts run back to back; a non-zero initial delay
//! turns on capped exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use metar_core::config::DEFAULT_MAX_ATTEMPTS;
use metar_core::CacheConfig;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt (doubles each attempt, zero disables)
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

impl From<&CacheConfig> for RetryConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: config.retry_delay(),
            max_delay: config.max_retry_delay(),
        }
    }
}

impl RetryConfig {
    /// Attempts with exponential backoff between them
    pub fn with_backoff(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Delay to wait after the given failed attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        // Exponential backoff: initial_delay * 2^attempt
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}

/// Run `operation` until it succeeds or the attempts are used up.
///
/// Returns the first success, or the last error once every attempt failed.
/// A config with zero attempts still runs the operation once.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("Feed retrieval succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;
                tracing::warn!(
                    "Feed retrieval failed on attempt {} of {}: {}",
                    attempt,
                    max_attempts,
                    e
                );

                if attempt >= max_attempts {
                    tracing::error!("All {} feed attempts exhausted", max_attempts);
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
