//! Retry logic with quadratic backoff.
//!
//! The connection manager uses this module to dial the broker at startup. The
//! sleep between attempts goes through the [`Sleeper`] trait so tests can run
//! the whole schedule instantly and inspect the delays.
//!
//! # Example
//!
//! ```rust
//! use event_relay_runtime::retry::{RetryPolicy, TokioSleeper, retry_with_sleeper};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .unit(Duration::from_millis(10))
//!     .build();
//!
//! let result = retry_with_sleeper(&policy, &TokioSleeper, || async {
//!     // Your fallible operation here
//!     Ok::<_, String>(42)
//! })
//! .await;
//! assert_eq!(result.ok(), Some(42));
//! # Ok(())
//! # }
//! ```

use event_relay_core::config::ConnectRetryConfig;
use event_relay_core::transport::BoxFuture;
use std::time::Duration;

/// Abstracts waiting between attempts.
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Retry policy configuration.
///
/// The delay before attempt `k` is `k² × unit`: 0, 1, 4, 9, 16, 25 units for
/// attempts 0..=5.
///
/// # Default Values
///
/// - `max_retries`: 5
/// - `unit`: one second
/// - `max_delay`: none (delays grow without a ceiling)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first one
    pub max_retries: usize,
    /// Base unit multiplied by `attempt²`
    pub unit: Duration,
    /// Optional cap on a single delay
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ConnectRetryConfig::default())
    }
}

impl From<&ConnectRetryConfig> for RetryPolicy {
    fn from(config: &ConnectRetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            unit: config.unit,
            max_delay: config.max_delay,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            unit: None,
            max_delay: None,
        }
    }

    /// Total number of attempts this policy allows.
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Calculate the delay before a given attempt number (0-based).
    ///
    /// Attempt 0 is the first dial and has no delay.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt.saturating_mul(attempt)).unwrap_or(u32::MAX);
        let delay = self.unit.saturating_mul(factor);

        match self.max_delay {
            Some(cap) if delay > cap => cap,
            _ => delay,
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    unit: Option<Duration>,
    max_delay: Option<Duration>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the unit multiplied by `attempt²`.
    #[must_use]
    pub const fn unit(mut self, unit: Duration) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set maximum delay (cap for backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            unit: self.unit.unwrap_or(defaults.unit),
            max_delay: self.max_delay.or(defaults.max_delay),
        }
    }
}

/// Outcome of an exhausted retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetriesExhausted<E> {
    /// Attempts made, including the first
    pub attempts: usize,
    /// Error from the final attempt
    pub last_error: E,
}

/// Retry an async operation, waiting through the supplied [`Sleeper`].
///
/// Before attempt `k` (0-based) the loop waits `policy.delay_for_attempt(k)`;
/// nothing is awaited before attempt 0.
///
/// # Errors
///
/// Returns [`RetriesExhausted`] once `policy.max_attempts()` attempts have failed.
pub async fn retry_with_sleeper<F, Fut, T, E>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, RetriesExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= policy.max_retries {
                    tracing::error!(
                        attempts = attempt + 1,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return Err(RetriesExhausted {
                        attempts: attempt + 1,
                        last_error: err,
                    });
                }

                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, backing off"
                );
                sleeper.sleep(delay).await;
            }
        }
    }
}
