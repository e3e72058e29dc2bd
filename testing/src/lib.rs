//! # Event Relay Testing
//!
//! Test doubles for the event relay.
//!
//! - [`InMemoryBroker`]: topic broker implementing the transport traits, with
//!   failure injection
//! - [`RecordingSink`]: sink that captures envelopes and can fail, delay or block
//! - [`RecordingSleeper`]: retry sleeper that records delays without waiting
//!
//! ## Example
//!
//! ```ignore
//! use event_relay_testing::{InMemoryBroker, RecordingSink};
//!
//! #[tokio::test]
//! async fn forwards_published_logs() {
//!     let broker = InMemoryBroker::new();
//!     let sink = RecordingSink::new();
//!     // wire an Emitter and a Consumer to `broker`, publish, then:
//!     assert!(sink.wait_for(1).await);
//! }
//! ```

pub mod broker;
pub mod sink;
pub mod sleeper;

pub use broker::{Binding, InMemoryBroker, PublishedMessage};
pub use sink::{RecordingSink, SinkOutcome};
pub use sleeper::RecordingSleeper;

use std::time::Duration;

/// How long [`eventually`] polls before giving up.
pub const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or [`EVENTUALLY_TIMEOUT`] elapses.
///
/// Returns whether the condition held.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + EVENTUALLY_TIMEOUT;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
