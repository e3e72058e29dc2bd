//! Liveness and metrics endpoints.

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode};

/// Simple health check endpoint (for basic liveness).
///
/// Does not touch the broker.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Prometheus text exposition.
///
/// # Endpoint
///
/// ```text
/// GET /metrics
/// ```
///
/// # Errors
///
/// Returns 503 if no Prometheus recorder was installed for this process.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .metrics()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
        .ok_or_else(|| AppError::unavailable("Metrics recorder not installed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
