//! Broker transport abstraction.
//!
//! The relay talks to the broker through three small traits:
//!
//! - [`Connector`] dials the broker and yields a [`BrokerConnection`]
//! - [`BrokerConnection`] is the one long-lived session per process and hands
//!   out channels
//! - [`BrokerChannel`] is a lightweight multiplexed session used for exactly one
//!   publish or one consume loop
//!
//! # Architecture
//!
//! ```text
//!  producer process                     consumer process
//! ┌──────────────┐                     ┌──────────────────┐
//! │   Emitter    │                     │     Consumer     │
//! │ (channel per │                     │ anonymous queue, │
//! │   publish)   │                     │ one binding per  │
//! └──────┬───────┘                     │ topic pattern    │
//!        │ routing key                 └────────▲─────────┘
//!        ▼                                      │
//! ┌─────────────────────────────────────────────┴──┐
//! │        logs_topic (topic, durable)             │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! # Dyn Compatibility
//!
//! Like the rest of the workspace, these traits return
//! `Pin<Box<dyn Future>>` instead of using `async fn`, so connections can be
//! shared as `Arc<dyn BrokerConnection>` and mocked in tests.

use crate::error::RelayError;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Stream of deliveries from a consumed queue.
///
/// An `Err` item or the end of the stream means the transport failed.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, RelayError>> + Send>>;

/// Exchange types understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Routes by wildcard matching of dotted routing keys
    Topic,
}

/// Declaration parameters for an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    /// Exchange name
    pub name: String,
    /// Exchange type
    pub kind: ExchangeKind,
    /// Survives broker restarts
    pub durable: bool,
}

impl ExchangeSpec {
    /// A durable topic exchange.
    #[must_use]
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeKind::Topic,
            durable: true,
        }
    }
}

/// Declaration parameters for a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    /// Queue name; empty asks the broker to generate one
    pub name: String,
    /// Survives broker restarts
    pub durable: bool,
    /// Deleted when the last consumer goes away
    pub auto_delete: bool,
    /// Only usable by the declaring connection
    pub exclusive: bool,
}

impl QueueSpec {
    /// A broker-named, exclusive, auto-deleting, non-durable queue.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            name: String::new(),
            durable: false,
            auto_delete: true,
            exclusive: true,
        }
    }
}

/// A message ready to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Message body
    pub body: Vec<u8>,
    /// MIME type attached as a message property
    pub content_type: String,
}

impl OutboundMessage {
    /// A message carrying a JSON body.
    #[must_use]
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            content_type: "application/json".to_string(),
        }
    }
}

/// How deliveries are acknowledged to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// The broker considers a message delivered as soon as it is sent to the
    /// consumer. A crash before dispatch loses the message (at-most-once).
    #[default]
    Auto,
    /// Messages are acknowledged after the handler finishes. A crash before
    /// that point causes redelivery (at-least-once).
    AfterDispatch,
}

/// Acknowledges a single delivery in [`AckMode::AfterDispatch`].
pub trait DeliveryAcker: Send + Sync {
    /// Acknowledge the delivery.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AckFailed`] if the channel is gone.
    fn ack(&self) -> BoxFuture<'_, Result<(), RelayError>>;
}

/// A message received from a queue.
#[derive(Clone)]
pub struct Delivery {
    /// Routing key the message was published with
    pub routing_key: String,
    /// Raw message body
    pub body: Vec<u8>,
    /// Present only for manually acknowledged consumers
    pub acker: Option<Arc<dyn DeliveryAcker>>,
}

impl Delivery {
    /// A delivery that needs no acknowledgement.
    #[must_use]
    pub fn new(routing_key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body: body.into(),
            acker: None,
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("manual_ack", &self.acker.is_some())
            .finish()
    }
}

/// Dials the broker.
pub trait Connector: Send + Sync {
    /// Make one connection attempt. Retrying is the caller's business.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConnectionFailed`] if the broker cannot be reached.
    fn connect<'a>(
        &'a self,
        address: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn BrokerConnection>, RelayError>>;
}

/// A live session to the broker, shared read-mostly inside one process.
pub trait BrokerConnection: Send + Sync {
    /// Open a fresh channel for one unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ChannelFailed`] if the connection is unusable.
    fn open_channel(&self) -> BoxFuture<'_, Result<Box<dyn BrokerChannel>, RelayError>>;

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConnectionFailed`] if the close handshake fails.
    fn close(&self) -> BoxFuture<'_, Result<(), RelayError>>;
}

/// A channel owned by exactly one emitter call or consumer loop.
pub trait BrokerChannel: Send + Sync {
    /// Declare an exchange. Re-declaring with identical properties is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DeclareFailed`] if the broker rejects it, for
    /// example because the exchange exists with different properties.
    fn declare_exchange<'a>(
        &'a self,
        exchange: &'a ExchangeSpec,
    ) -> BoxFuture<'a, Result<(), RelayError>>;

    /// Declare a queue and return its (possibly broker-generated) name.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::QueueDeclareFailed`] on rejection.
    fn declare_queue<'a>(&'a self, queue: &'a QueueSpec)
    -> BoxFuture<'a, Result<String, RelayError>>;

    /// Bind `queue` to `exchange` under a routing pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BindFailed`] on rejection.
    fn bind_queue<'a>(
        &'a self,
        queue: &'a str,
        exchange: &'a str,
        pattern: &'a str,
    ) -> BoxFuture<'a, Result<(), RelayError>>;

    /// Publish without waiting for broker confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PublishFailed`] only for synchronous failures.
    /// Unroutable messages are silently dropped by the broker.
    fn publish<'a>(
        &'a self,
        exchange: &'a str,
        routing_key: &'a str,
        message: OutboundMessage,
    ) -> BoxFuture<'a, Result<(), RelayError>>;

    /// Start consuming a queue.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConsumeFailed`] if the consumer cannot be registered.
    fn consume<'a>(
        &'a self,
        queue: &'a str,
        ack_mode: AckMode,
    ) -> BoxFuture<'a, Result<DeliveryStream, RelayError>>;

    /// Close the channel.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ChannelFailed`] if the close handshake fails.
    fn close(&self) -> BoxFuture<'_, Result<(), RelayError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_queue_is_exclusive_and_transient() {
        let queue = QueueSpec::anonymous();
        assert!(queue.name.is_empty());
        assert!(queue.exclusive);
        assert!(queue.auto_delete);
        assert!(!queue.durable);
    }

    #[test]
    fn topic_exchange_is_durable() {
        let exchange = ExchangeSpec::topic("logs_topic");
        assert_eq!(exchange.kind, ExchangeKind::Topic);
        assert!(exchange.durable);
    }

    #[test]
    fn json_messages_carry_content_type() {
        let message = OutboundMessage::json(b"{}".to_vec());
        assert_eq!(message.content_type, "application/json");
    }

    #[test]
    fn default_ack_mode_is_auto() {
        assert_eq!(AckMode::default(), AckMode::Auto);
    }
}
