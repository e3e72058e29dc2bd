//! Event Emitter (producer side).
//!
//! Each [`Emitter::push`] opens its own channel on the shared connection,
//! declares the exchange, publishes and closes the channel again. Concurrent
//! pushes therefore never share a channel and need no locking.
//!
//! Publishing is fire-and-forget: the broker's routing outcome is not awaited,
//! and a message whose routing key matches no binding is simply dropped.

use crate::topology::{close_quietly, declare_exchange};
use event_relay_core::envelope::Envelope;
use event_relay_core::error::RelayError;
use event_relay_core::routing::EXCHANGE_NAME;
use event_relay_core::transport::{BrokerConnection, OutboundMessage};
use std::sync::Arc;
use std::time::Instant;

/// Publishes messages to the topic exchange.
///
/// Cheap to clone; clones share the underlying connection.
///
/// # Example
///
/// ```ignore
/// let emitter = Emitter::new(connection).await?;
/// emitter.emit(&Envelope::new("log", "user logged in"), "log.INFO").await?;
/// ```
#[derive(Clone)]
pub struct Emitter {
    connection: Arc<dyn BrokerConnection>,
    exchange: String,
}

impl Emitter {
    /// Create an emitter for the default `logs_topic` exchange and declare it.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the exchange cannot be declared.
    pub async fn new(connection: Arc<dyn BrokerConnection>) -> Result<Self, RelayError> {
        Self::with_exchange(connection, EXCHANGE_NAME).await
    }

    /// Create an emitter for a named exchange and declare it.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the exchange cannot be declared.
    pub async fn with_exchange(
        connection: Arc<dyn BrokerConnection>,
        exchange: impl Into<String>,
    ) -> Result<Self, RelayError> {
        let emitter = Self {
            connection,
            exchange: exchange.into(),
        };
        emitter.setup().await?;
        Ok(emitter)
    }

    /// The exchange this emitter publishes to.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn setup(&self) -> Result<(), RelayError> {
        let channel = self.connection.open_channel().await?;
        let declared = declare_exchange(channel.as_ref(), &self.exchange).await;
        close_quietly(channel.as_ref()).await;
        declared
    }

    /// Publish a raw message under `routing_key`.
    ///
    /// The message is sent with content type `application/json`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if no channel can be opened, the exchange
    /// cannot be declared, or the publish fails synchronously.
    pub async fn push(&self, message: &str, routing_key: &str) -> Result<(), RelayError> {
        let start = Instant::now();
        let result = self.publish(message.as_bytes().to_vec(), routing_key).await;

        match &result {
            Ok(()) => {
                metrics::counter!("relay_messages_published_total").increment(1);
                metrics::histogram!("relay_publish_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::debug!(
                    exchange = %self.exchange,
                    routing_key = %routing_key,
                    bytes = message.len(),
                    "Message published"
                );
            }
            Err(e) => {
                metrics::counter!("relay_publish_errors_total").increment(1);
                tracing::error!(
                    exchange = %self.exchange,
                    routing_key = %routing_key,
                    error = %e,
                    "Failed to publish message"
                );
            }
        }

        result
    }

    /// Serialize an envelope and publish it under `routing_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if encoding fails, otherwise the
    /// errors of [`Emitter::push`].
    pub async fn emit(&self, envelope: &Envelope, routing_key: &str) -> Result<(), RelayError> {
        let body = envelope.to_json_bytes()?;
        let message = String::from_utf8(body).map_err(|e| RelayError::Serialization(e.to_string()))?;
        self.push(&message, routing_key).await
    }

    async fn publish(&self, body: Vec<u8>, routing_key: &str) -> Result<(), RelayError> {
        let channel = self.connection.open_channel().await?;

        let published = async {
            declare_exchange(channel.as_ref(), &self.exchange).await?;
            channel
                .publish(&self.exchange, routing_key, OutboundMessage::json(body))
                .await
        }
        .await;

        close_quietly(channel.as_ref()).await;
        published
    }
}
