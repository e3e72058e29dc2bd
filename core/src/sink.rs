//! Downstream sink seam.
//!
//! A sink receives envelopes that the dispatcher routed to it. The production
//! sink POSTs JSON to the logger service; tests use a recording sink.

use crate::envelope::Envelope;
use crate::error::SinkError;
use crate::transport::BoxFuture;

/// Destination for dispatched envelopes.
pub trait EventSink: Send + Sync {
    /// Deliver one envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the request fails or the sink does not accept
    /// the envelope. Callers log and drop the error; nothing is retried.
    fn deliver<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, Result<(), SinkError>>;
}
