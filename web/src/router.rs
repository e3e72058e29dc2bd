//! Broker service HTTP router.

use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{get, post},
};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the broker router with all endpoints.
///
/// # Routes
///
/// - `POST /` - Liveness probe
/// - `POST /handle` - Submit an action
/// - `GET /health` - Health check
/// - `GET /metrics` - Prometheus metrics
///
/// # Example
///
/// ```rust,ignore
/// let app = router(AppState::new(emitter));
/// axum::serve(listener, app).await?;
/// ```
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handlers::hit_broker))
        .route("/handle", post(handlers::handle_submission))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy: any http(s) origin, credentials allowed, five minute preflight cache.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            let origin = origin.as_bytes();
            origin.starts_with(b"http://") || origin.starts_with(b"https://")
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([header::LINK])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300))
}
