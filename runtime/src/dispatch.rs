//! Dispatch and handler routing.
//!
//! Every consumed envelope is routed by its `name`:
//!
//! | name | route |
//! |---|---|
//! | `"log"`, `"event"` | forwarded to the logging sink |
//! | `"auth"` | reserved, currently does nothing |
//! | anything else | forwarded to the logging sink |
//!
//! [`Dispatcher::handle`] never fails. Sink errors are logged, counted and
//! dropped; the consume loop keeps running and nothing is retried.

use crate::stats::DispatchStats;
use event_relay_core::envelope::Envelope;
use event_relay_core::sink::EventSink;
use std::sync::Arc;
use std::time::Instant;

/// Where an envelope goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Forward to the logging sink
    Log,
    /// Reserved for authentication events; intentionally a no-op for now
    Auth,
}

impl Route {
    /// Pick the route for an envelope name.
    #[must_use]
    pub fn for_name(name: &str) -> Self {
        match name {
            "auth" => Self::Auth,
            _ => Self::Log,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Auth => "auth",
        }
    }
}

/// Routes envelopes to the downstream sink.
pub struct Dispatcher {
    sink: Arc<dyn EventSink>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Create a dispatcher with fresh counters.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_stats(sink, Arc::new(DispatchStats::new()))
    }

    /// Create a dispatcher reporting into existing counters.
    #[must_use]
    pub const fn with_stats(sink: Arc<dyn EventSink>, stats: Arc<DispatchStats>) -> Self {
        Self { sink, stats }
    }

    /// Counters updated by this dispatcher.
    #[must_use]
    pub const fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Handle one envelope.
    pub async fn handle(&self, envelope: Envelope) {
        let route = Route::for_name(envelope.name());
        metrics::counter!("relay_dispatch_total", "route" => route.as_str()).increment(1);

        match route {
            Route::Auth => {
                tracing::trace!("Auth event received, nothing to do");
                self.stats.record_skipped();
            }
            Route::Log => {
                let start = Instant::now();
                let result = self.sink.deliver(&envelope).await;
                metrics::histogram!("relay_sink_duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                match result {
                    Ok(()) => {
                        tracing::debug!(name = %envelope.name(), "Event forwarded to logger");
                        self.stats.record_forwarded();
                    }
                    Err(e) => {
                        tracing::error!(
                            name = %envelope.name(),
                            error = %e,
                            "Failed to forward event to logger"
                        );
                        self.stats.record_sink_failure();
                    }
                }
            }
        }
    }
}
