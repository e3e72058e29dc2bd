//! Broker router tests against the in-memory broker.

#![allow(clippy::unwrap_used)]

use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum_test::TestServer;
use event_relay_core::envelope::Envelope;
use event_relay_core::transport::Connector;
use event_relay_runtime::Emitter;
use event_relay_runtime::metrics::MetricsServer;
use event_relay_testing::InMemoryBroker;
use event_relay_web::{AppState, router};
use serde_json::{Value, json};

async fn server(broker: &InMemoryBroker) -> TestServer {
    let connection = broker.connect("memory").await.unwrap();
    let emitter = Emitter::new(connection).await.unwrap();
    TestServer::new(router(AppState::new(emitter))).unwrap()
}

#[tokio::test]
async fn root_reports_broker_hit() {
    let broker = InMemoryBroker::new();
    let server = server(&broker).await;

    let response = server.post("/").await;

    response.assert_status(StatusCode::OK);
    assert_eq!(
        response.json::<Value>(),
        json!({"error": false, "message": "Hit the Broker"})
    );
}

#[tokio::test]
async fn log_action_publishes_under_info_key() {
    let broker = InMemoryBroker::new();
    let server = server(&broker).await;

    let response = server
        .post("/handle")
        .json(&json!({"action": "log", "log": {"name": "event", "data": "user signed up"}}))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(
        response.json::<Value>(),
        json!({"error": false, "message": "logged via RabbitMQ"})
    );

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, "logs_topic");
    assert_eq!(published[0].routing_key, "log.INFO");
    assert_eq!(
        Envelope::decode(&published[0].body).unwrap(),
        Envelope::new("event", "user signed up")
    );
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let broker = InMemoryBroker::new();
    let server = server(&broker).await;

    for action in ["auth", "mail", "dance"] {
        let response = server
            .post("/handle")
            .json(&json!({"action": action}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["error"], json!(true));
        assert_eq!(body["message"], json!("Unknown Action..."));
    }
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let broker = InMemoryBroker::new();
    let server = server(&broker).await;

    let response = server
        .post("/handle")
        .content_type("application/json")
        .text("{not json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], json!(true));
}

#[tokio::test]
async fn broker_failure_is_service_unavailable() {
    let broker = InMemoryBroker::new();
    let server = server(&broker).await;
    broker.fail_publishes(true);

    let response = server
        .post("/handle")
        .json(&json!({"action": "log", "log": {"name": "log", "data": "x"}}))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body = response.json::<Value>();
    assert_eq!(body["error"], json!(true));
    assert_eq!(body["code"], json!("SERVICE_UNAVAILABLE"));
}

#[tokio::test]
async fn health_is_ok() {
    let broker = InMemoryBroker::new();
    let server = server(&broker).await;

    let response = server.get("/health").await;

    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn metrics_without_recorder_is_unavailable() {
    let broker = InMemoryBroker::new();
    let server = server(&broker).await;

    server
        .get("/metrics")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_render_when_recorder_installed() {
    let broker = InMemoryBroker::new();
    let connection = broker.connect("memory").await.unwrap();
    let emitter = Emitter::new(connection).await.unwrap();

    let mut metrics = MetricsServer::new("127.0.0.1:0".parse().unwrap());
    metrics.start().unwrap();
    let Some(handle) = metrics.handle().cloned() else {
        // Another test in this process installed the recorder first.
        return;
    };

    let server = TestServer::new(router(AppState::new(emitter).with_metrics(handle))).unwrap();
    server
        .post("/handle")
        .json(&json!({"action": "log", "log": {"name": "log", "data": "x"}}))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let response = server.get("/metrics").await;
    response.assert_status_ok();
    assert!(response.text().contains("relay_messages_published_total"));
}

#[tokio::test]
async fn cors_preflight_allows_http_origins() {
    let broker = InMemoryBroker::new();
    let server = server(&broker).await;

    let response = server
        .method(Method::OPTIONS, "/handle")
        .add_header(
            header::ORIGIN,
            HeaderValue::from_static("http://localhost:3000"),
        )
        .add_header(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("POST"),
        )
        .add_header(
            HeaderName::from_static("access-control-request-headers"),
            HeaderValue::from_static("content-type"),
        )
        .await;

    assert_eq!(
        response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "http://localhost:3000"
    );
    assert_eq!(
        response.header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS),
        "true"
    );
}
