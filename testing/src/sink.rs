//! Recording sink.
//!
//! Captures every envelope handed to it and answers with a configurable
//! outcome. A gated sink holds each call until the test releases it, which
//! makes concurrency observable.

use event_relay_core::envelope::Envelope;
use event_relay_core::error::SinkError;
use event_relay_core::sink::EventSink;
use event_relay_core::transport::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Outcome returned by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SinkOutcome {
    /// Accept every envelope
    #[default]
    Accept,
    /// Answer with a non-202 status
    Reject(u16),
    /// Fail as if the endpoint were unreachable
    Unreachable,
}

#[derive(Default)]
struct SinkState {
    received: Mutex<Vec<Envelope>>,
    outcome: Mutex<SinkOutcome>,
    delay: Mutex<Option<Duration>>,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// [`EventSink`] that records what it receives.
///
/// Clones share the same recording.
#[derive(Clone, Default)]
pub struct RecordingSink {
    state: Arc<SinkState>,
}

impl RecordingSink {
    /// A sink that accepts everything immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose calls block until [`RecordingSink::release`] lets them through.
    #[must_use]
    pub fn gated() -> Self {
        Self {
            state: Arc::new(SinkState {
                gate: Some(Semaphore::new(0)),
                ..SinkState::default()
            }),
        }
    }

    /// Change the outcome of subsequent calls.
    #[must_use]
    pub fn with_outcome(self, outcome: SinkOutcome) -> Self {
        *self
            .state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = outcome;
        self
    }

    /// Delay each call by `delay` before answering.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self
            .state
            .delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    /// Let `n` blocked or future calls of a gated sink proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(n);
        }
    }

    /// Envelopes received so far, in call order.
    #[must_use]
    pub fn received(&self) -> Vec<Envelope> {
        self.state
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Calls currently inside the sink.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were inside the sink at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` calls were made.
    ///
    /// Returns `false` if that does not happen within the polling window.
    pub async fn wait_for(&self, n: usize) -> bool {
        crate::eventually(|| self.count() >= n).await
    }

    fn outcome(&self) -> SinkOutcome {
        self.state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn delay(&self) -> Option<Duration> {
        *self
            .state
            .delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for RecordingSink {
    fn deliver<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.state
                .received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(envelope.clone());

            let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.state
                .peak_in_flight
                .fetch_max(current, Ordering::SeqCst);

            if let Some(gate) = &self.state.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if let Some(delay) = self.delay() {
                tokio::time::sleep(delay).await;
            }

            self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.outcome() {
                SinkOutcome::Accept => Ok(()),
                SinkOutcome::Reject(status) => Err(SinkError::Rejected { status }),
                SinkOutcome::Unreachable => {
                    Err(SinkError::Request("connection refused".to_string()))
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_accepts() {
        let sink = RecordingSink::new();
        let result = sink.deliver(&Envelope::new("log", "hello")).await;

        assert_eq!(result, Ok(()));
        assert_eq!(sink.received(), vec![Envelope::new("log", "hello")]);
    }

    #[tokio::test]
    async fn rejecting_sink_reports_status() {
        let sink = RecordingSink::new().with_outcome(SinkOutcome::Reject(500));
        let result = sink.deliver(&Envelope::new("log", "hello")).await;

        assert_eq!(result, Err(SinkError::Rejected { status: 500 }));
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn gated_sink_holds_calls_until_released() {
        let sink = RecordingSink::gated();
        let task = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.deliver(&Envelope::new("log", "x")).await })
        };

        assert!(sink.wait_for(1).await);
        assert_eq!(sink.in_flight(), 1);

        sink.release(1);
        assert_eq!(task.await.unwrap(), Ok(()));
        assert_eq!(sink.in_flight(), 0);
        assert_eq!(sink.peak_in_flight(), 1);
    }
}
