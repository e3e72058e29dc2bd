//! Broker endpoints: the upstream trigger of the relay.
//!
//! `POST /handle` takes `{"action": "...", "log": {"name": "...", "data": "..."}}`.
//! Only the `log` action is served here; it is published to the topic exchange
//! under `log.INFO`.

use crate::WebResult;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use event_relay_core::envelope::Envelope;
use event_relay_core::routing::Severity;
use serde::{Deserialize, Serialize};

/// Body of `POST /handle`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestPayload {
    /// What to do with the payload
    pub action: String,
    /// Payload of the `log` action
    #[serde(default)]
    pub log: LogPayload,
}

/// A log entry to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    /// Event name
    #[serde(default)]
    pub name: String,
    /// Event payload
    #[serde(default)]
    pub data: String,
}

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonResponse {
    /// Always `false` on success
    pub error: bool,
    /// Human-readable outcome
    pub message: String,
}

impl JsonResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            error: false,
            message: message.into(),
        })
    }
}

/// Liveness probe of the broker API.
///
/// # Endpoint
///
/// ```text
/// POST /
/// ```
#[allow(clippy::unused_async)]
pub async fn hit_broker() -> (StatusCode, Json<JsonResponse>) {
    (StatusCode::OK, JsonResponse::ok("Hit the Broker"))
}

/// Route a submission by its `action`.
///
/// # Endpoint
///
/// ```text
/// POST /handle
/// ```
///
/// # Errors
///
/// - 400 if the body is not a valid request or the action is unknown
/// - 503 if the message cannot be handed to the broker
pub async fn handle_submission(
    State(state): State<AppState>,
    payload: Result<Json<RequestPayload>, JsonRejection>,
) -> WebResult<(StatusCode, Json<JsonResponse>)> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    match request.action.as_str() {
        "log" => log_event(&state, request.log).await,
        other => {
            tracing::debug!(action = %other, "Unknown action submitted");
            Err(AppError::bad_request("Unknown Action..."))
        }
    }
}

async fn log_event(
    state: &AppState,
    entry: LogPayload,
) -> WebResult<(StatusCode, Json<JsonResponse>)> {
    let envelope = Envelope::new(entry.name, entry.data);
    state
        .emitter()
        .emit(&envelope, Severity::Info.routing_key())
        .await?;

    tracing::info!(name = %envelope.name(), "Log event published");
    Ok((StatusCode::ACCEPTED, JsonResponse::ok("logged via RabbitMQ")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn request_without_log_payload_decodes() {
        let request: RequestPayload = serde_json::from_str(r#"{"action":"mail"}"#).unwrap();
        assert_eq!(request.action, "mail");
        assert_eq!(request.log, LogPayload::default());
    }

    #[test]
    fn request_with_log_payload_decodes() {
        let request: RequestPayload =
            serde_json::from_str(r#"{"action":"log","log":{"name":"event","data":"hello"}}"#)
                .unwrap();
        assert_eq!(request.log.name, "event");
        assert_eq!(request.log.data, "hello");
    }

    #[tokio::test]
    async fn hit_broker_answers_ok() {
        let (status, Json(body)) = hit_broker().await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.error);
        assert_eq!(body.message, "Hit the Broker");
    }
}
