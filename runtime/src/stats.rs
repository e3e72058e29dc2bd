//! Consumer-side counters.
//!
//! Decode and dispatch failures are recovered locally and never surface as
//! errors. [`DispatchStats`] makes them observable: every counter here is also
//! mirrored into the `metrics` facade (in-flight tasks as a gauge), but tests
//! read the atomics directly.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by a consumer and its dispatch tasks.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    decode_failures: AtomicU64,
    forwarded: AtomicU64,
    skipped: AtomicU64,
    sink_failures: AtomicU64,
    ack_failures: AtomicU64,
    in_flight: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Deliveries pulled off the queue
    pub received: u64,
    /// Bodies that were not valid envelopes
    pub decode_failures: u64,
    /// Envelopes accepted by the sink
    pub forwarded: u64,
    /// Envelopes intentionally not forwarded
    pub skipped: u64,
    /// Envelopes the sink failed or refused
    pub sink_failures: u64,
    /// Manual acknowledgements that failed
    pub ack_failures: u64,
    /// Dispatch tasks currently running
    pub in_flight: u64,
}

impl StatsSnapshot {
    /// Dispatch tasks that have finished, whatever their outcome.
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.forwarded + self.skipped + self.sink_failures
    }
}

impl DispatchStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_messages_consumed_total").increment(1);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_decode_errors_total").increment(1);
    }

    pub(crate) fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_events_forwarded_total").increment(1);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_events_skipped_total").increment(1);
    }

    pub(crate) fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_sink_errors_total").increment(1);
    }

    pub(crate) fn record_ack_failure(&self) {
        self.ack_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_ack_errors_total").increment(1);
    }

    pub(crate) fn task_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!("relay_dispatch_in_flight").increment(1.0);
    }

    pub(crate) fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("relay_dispatch_in_flight").decrement(1.0);
    }
}
