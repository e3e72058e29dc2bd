//! # Event Relay Core
//!
//! Core types and traits for distributing log/event messages from producer
//! services to consumer services through a topic exchange.
//!
//! This crate performs no I/O. It defines:
//!
//! - **Envelope**: the `{name, data}` message carried on the wire
//! - **Routing**: routing keys, topic-pattern matching and the fixed exchange name
//! - **Transport**: traits for dialing the broker, opening channels, declaring
//!   topology, publishing and consuming
//! - **Sink**: the downstream destination of dispatched envelopes
//! - **Config**: explicit process configuration
//!
//! ## Delivery Guarantees
//!
//! - Messages published under a routing key that matches a live binding are
//!   delivered to that queue at least once while the binding exists
//! - Messages with no matching binding are dropped by the exchange
//! - By default consumers auto-acknowledge, so a crash between receipt and
//!   dispatch loses the message (at-most-once); see [`transport::AckMode`]
//!
//! ## Example
//!
//! ```
//! use event_relay_core::{Envelope, topic_matches, EXCHANGE_NAME};
//!
//! let envelope = Envelope::new("log", "user logged in");
//! assert_eq!(envelope.name(), "log");
//! assert_eq!(EXCHANGE_NAME, "logs_topic");
//! assert!(topic_matches("log.*", "log.WARNING"));
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod routing;
pub mod sink;
pub mod transport;

pub use config::{ConfigError, ConnectRetryConfig, DispatchConfig, RelayConfig};
pub use envelope::Envelope;
pub use error::{RelayError, SinkError};
pub use routing::{DEFAULT_TOPICS, EXCHANGE_NAME, Severity, topic_matches};
pub use sink::EventSink;
pub use transport::{
    AckMode, BoxFuture, BrokerChannel, BrokerConnection, Connector, Delivery, DeliveryAcker,
    DeliveryStream, ExchangeKind, ExchangeSpec, OutboundMessage, QueueSpec,
};
