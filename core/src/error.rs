//! Error taxonomy for the event relay.
//!
//! Only transport-level failures travel across component boundaries as
//! [`RelayError`]. Downstream sink failures are reported as [`SinkError`] to the
//! dispatcher, which logs and counts them but never propagates them further.

use thiserror::Error;

/// Errors raised while talking to the broker or encoding envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// A single dial attempt failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection manager gave up after the configured number of attempts
    #[error("Broker unreachable after {attempts} attempts: {reason}")]
    RetriesExhausted {
        /// Total dial attempts made, including the first one
        attempts: usize,
        /// Error reported by the last attempt
        reason: String,
    },

    /// Failed to open or use a channel
    #[error("Channel error: {0}")]
    ChannelFailed(String),

    /// Exchange declaration was rejected
    #[error("Failed to declare exchange '{exchange}': {reason}")]
    DeclareFailed {
        /// The exchange that failed
        exchange: String,
        /// The reason for failure
        reason: String,
    },

    /// Queue declaration was rejected
    #[error("Failed to declare queue: {0}")]
    QueueDeclareFailed(String),

    /// Binding a queue to a routing pattern failed
    #[error("Failed to bind queue '{queue}' to pattern '{pattern}': {reason}")]
    BindFailed {
        /// The queue being bound
        queue: String,
        /// The routing pattern
        pattern: String,
        /// The reason for failure
        reason: String,
    },

    /// Publishing a message failed synchronously
    #[error("Publish failed for routing key '{routing_key}': {reason}")]
    PublishFailed {
        /// The routing key of the message
        routing_key: String,
        /// The reason for failure
        reason: String,
    },

    /// Starting a consumer failed
    #[error("Consume failed: {0}")]
    ConsumeFailed(String),

    /// The broker stopped delivering (channel or connection closed)
    #[error("Delivery stream closed")]
    DeliveryStreamClosed,

    /// Failed to acknowledge a delivery
    #[error("Acknowledge failed: {0}")]
    AckFailed(String),

    /// Failed to serialize an envelope
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize an envelope
    #[error("Deserialization failed: {0}")]
    Deserialization(String),
}

impl RelayError {
    /// Whether this error originates from the broker transport.
    ///
    /// Encoding errors are local and never reach the caller of `push`/`listen`.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        !matches!(self, Self::Serialization(_) | Self::Deserialization(_))
    }
}

/// Errors reported by a downstream sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The request never produced a response
    #[error("Sink request failed: {0}")]
    Request(String),

    /// The sink answered with something other than "accepted"
    #[error("Sink rejected event with status {status}")]
    Rejected {
        /// HTTP status code returned by the sink
        status: u16,
    },
}
