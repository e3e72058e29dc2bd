//! Application state for Axum handlers.

use event_relay_runtime::Emitter;
use metrics_exporter_prometheus::PrometheusHandle;

/// State shared by every broker-service handler.
///
/// Holds the emitter built on the process-wide broker connection and, when
/// the Prometheus recorder was installed, the handle used to render it.
#[derive(Clone)]
pub struct AppState {
    emitter: Emitter,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create state around an emitter, without metrics rendering.
    #[must_use]
    pub const fn new(emitter: Emitter) -> Self {
        Self {
            emitter,
            metrics: None,
        }
    }

    /// Render metrics from `handle` on `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// The emitter used for `log` submissions.
    #[must_use]
    pub const fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// The Prometheus handle, if one was installed.
    #[must_use]
    pub const fn metrics(&self) -> Option<&PrometheusHandle> {
        self.metrics.as_ref()
    }
}
