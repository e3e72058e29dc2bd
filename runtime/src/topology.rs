//! Topology declaration and channel housekeeping.
//!
//! Both emitters and consumers declare the exchange before using it. The
//! declaration is idempotent on the broker side, so several processes may issue
//! it concurrently without coordination.

use event_relay_core::error::RelayError;
use event_relay_core::transport::{BrokerChannel, ExchangeSpec};

/// Declare `exchange` as a durable topic exchange on `channel`.
///
/// # Errors
///
/// Returns [`RelayError::DeclareFailed`] if the broker rejects the declaration,
/// for example when the exchange already exists with a different type.
pub async fn declare_exchange(channel: &dyn BrokerChannel, exchange: &str) -> Result<(), RelayError> {
    let topic = ExchangeSpec::topic(exchange);
    channel.declare_exchange(&topic).await?;
    tracing::debug!(exchange = %exchange, kind = "topic", durable = topic.durable, "Exchange declared");
    Ok(())
}

/// Close `channel`, logging rather than returning a failed close.
pub async fn close_quietly(channel: &dyn BrokerChannel) {
    if let Err(e) = channel.close().await {
        tracing::debug!(error = %e, "Failed to close channel");
    }
}
