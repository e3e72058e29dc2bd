//! Prometheus metrics for observability and monitoring.
//!
//! Components record through the `metrics` facade:
//! - Connection attempts
//! - Messages published and publish failures
//! - Messages consumed, decode failures and dispatch outcomes
//! - Sink and publish latency
//!
//! [`MetricsServer`] installs the Prometheus recorder. The broker service
//! renders it on `GET /metrics`; the listener service can expose it through the
//! exporter's own HTTP listener.
//!
//! # Example
//!
//! ```rust,no_run
//! use event_relay_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! let text = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address used by [`MetricsServer::start_with_listener`]
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and keep a handle for [`MetricsServer::render`].
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be built or installed. A recorder
    /// that is already installed (common in tests) is logged and tolerated.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        match builder()?.install_recorder() {
            Ok(handle) => {
                register_metrics();
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => tolerate_reinstall(&e.to_string()),
        }
    }

    /// Install the recorder behind the exporter's own HTTP listener on `addr`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be built or installed.
    pub fn start_with_listener(&mut self) -> Result<(), MetricsError> {
        match builder()?.with_http_listener(self.addr).install() {
            Ok(()) => {
                register_metrics();
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => tolerate_reinstall(&e.to_string()),
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))
}

fn tolerate_reinstall(err_msg: &str) -> Result<(), MetricsError> {
    if err_msg.contains("already initialized") {
        tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
        Ok(())
    } else {
        Err(MetricsError::Install(err_msg.to_string()))
    }
}

/// Describe every relay metric to the installed recorder.
fn register_metrics() {
    describe_counter!(
        "relay_connect_attempts_total",
        "Total number of broker dial attempts"
    );
    describe_counter!(
        "relay_messages_published_total",
        "Total number of messages published to the exchange"
    );
    describe_counter!(
        "relay_publish_errors_total",
        "Total number of synchronous publish failures"
    );
    describe_histogram!(
        "relay_publish_duration_seconds",
        "Time taken to open a channel, declare and publish"
    );
    describe_counter!(
        "relay_messages_consumed_total",
        "Total number of deliveries pulled off the queue"
    );
    describe_counter!(
        "relay_decode_errors_total",
        "Total number of message bodies that were not valid envelopes"
    );
    describe_counter!(
        "relay_dispatch_total",
        "Total number of dispatched envelopes by route"
    );
    describe_counter!(
        "relay_events_forwarded_total",
        "Total number of envelopes accepted by the sink"
    );
    describe_counter!(
        "relay_events_skipped_total",
        "Total number of envelopes intentionally not forwarded"
    );
    describe_counter!(
        "relay_ack_errors_total",
        "Total number of failed manual acknowledgements"
    );
    describe_gauge!(
        "relay_dispatch_in_flight",
        "Dispatch tasks currently running"
    );
    describe_counter!(
        "relay_sink_errors_total",
        "Total number of envelopes the sink failed or refused"
    );
    describe_histogram!(
        "relay_sink_duration_seconds",
        "Time taken by the downstream sink"
    );
}
