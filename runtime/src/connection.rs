//! Connection Manager.
//!
//! Dials the broker once per process at startup, retrying with quadratic
//! backoff. The default policy allows six dials (delays of 0, 1, 4, 9, 16 and
//! 25 seconds before them); the sixth consecutive failure is fatal and
//! [`ConnectionManager::connect`] returns [`RelayError::RetriesExhausted`].
//! Service binaries terminate the process on that error.

use crate::retry::{RetryPolicy, Sleeper, TokioSleeper, retry_with_sleeper};
use event_relay_core::config::ConnectRetryConfig;
use event_relay_core::error::RelayError;
use event_relay_core::transport::{BrokerConnection, Connector};
use std::sync::Arc;

/// Establishes the single long-lived broker connection.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(Arc::new(AmqpConnector::new()), &config.retry);
/// let connection = manager.connect(&config.broker_url).await?;
/// ```
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ConnectionManager {
    /// Create a manager that sleeps on the tokio timer.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, retry: &ConnectRetryConfig) -> Self {
        Self {
            connector,
            policy: RetryPolicy::from(retry),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper, typically with a recording one in tests.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The active retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Dial `address` until it succeeds or the policy is exhausted.
    ///
    /// No other work happens while this is pending.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RetriesExhausted`] once every allowed attempt has
    /// failed. Callers treat this as fatal.
    pub async fn connect(&self, address: &str) -> Result<Arc<dyn BrokerConnection>, RelayError> {
        let connector = &self.connector;

        let result = retry_with_sleeper(&self.policy, self.sleeper.as_ref(), || async move {
            metrics::counter!("relay_connect_attempts_total").increment(1);
            match connector.connect(address).await {
                Ok(connection) => Ok(connection),
                Err(e) => {
                    tracing::warn!(error = %e, "Broker not ready");
                    Err(e)
                }
            }
        })
        .await;

        match result {
            Ok(connection) => {
                tracing::info!("Connected to broker");
                Ok(connection)
            }
            Err(exhausted) => Err(RelayError::RetriesExhausted {
                attempts: exhausted.attempts,
                reason: exhausted.last_error.to_string(),
            }),
        }
    }
}
