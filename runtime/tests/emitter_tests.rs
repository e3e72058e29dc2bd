//! Emitter behavior against the in-memory broker.

#![allow(clippy::unwrap_used)]

use event_relay_core::envelope::Envelope;
use event_relay_core::error::RelayError;
use event_relay_core::routing::{EXCHANGE_NAME, Severity};
use event_relay_core::transport::{Connector, ExchangeKind};
use event_relay_runtime::Emitter;
use event_relay_testing::InMemoryBroker;

async fn emitter(broker: &InMemoryBroker) -> Emitter {
    let connection = broker.connect("memory").await.unwrap();
    Emitter::new(connection).await.unwrap()
}

#[tokio::test]
async fn construction_declares_durable_topic_exchange() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker).await;

    let exchange = broker.exchange(EXCHANGE_NAME).unwrap();
    assert_eq!(emitter.exchange(), "logs_topic");
    assert_eq!(exchange.kind, ExchangeKind::Topic);
    assert!(exchange.durable);
    assert_eq!(broker.open_channels(), 0);
}

#[tokio::test]
async fn construction_fails_when_no_channel_can_be_opened() {
    let broker = InMemoryBroker::new();
    broker.fail_channels(true);
    let connection = broker.connect("memory").await.unwrap();

    let result = Emitter::new(connection).await;

    assert!(matches!(result, Err(RelayError::ChannelFailed(_))));
}

#[tokio::test]
async fn push_publishes_json_under_routing_key() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker).await;

    emitter
        .push(r#"{"name":"log","data":"x"}"#, "log.INFO")
        .await
        .unwrap();

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, "logs_topic");
    assert_eq!(published[0].routing_key, "log.INFO");
    assert_eq!(published[0].content_type, "application/json");
    assert_eq!(published[0].body_text(), r#"{"name":"log","data":"x"}"#);
}

#[tokio::test]
async fn each_push_closes_its_channel() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker).await;

    for _ in 0..3 {
        emitter.push("{}", "log.INFO").await.unwrap();
    }

    assert_eq!(broker.open_channels(), 0);
    assert_eq!(broker.published().len(), 3);
}

#[tokio::test]
async fn unroutable_push_still_succeeds() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker).await;

    tokio_test::assert_ok!(emitter.push("{}", "nobody.listens.here").await);
}

#[tokio::test]
async fn synchronous_publish_failure_is_reported() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker).await;
    broker.fail_publishes(true);

    let result = emitter.push("{}", "log.ERROR").await;

    assert!(matches!(
        result,
        Err(RelayError::PublishFailed { routing_key, .. }) if routing_key == "log.ERROR"
    ));
    assert_eq!(broker.open_channels(), 0);
}

#[tokio::test]
async fn lost_connection_fails_push() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker).await;
    broker.disconnect();

    let result = emitter.push("{}", "log.INFO").await;

    assert!(matches!(result, Err(RelayError::ChannelFailed(_))));
}

#[tokio::test]
async fn emit_encodes_envelope() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker).await;

    emitter
        .emit(
            &Envelope::new("log", "user logged in"),
            Severity::Warning.routing_key(),
        )
        .await
        .unwrap();

    let published = broker.published();
    assert_eq!(published[0].routing_key, "log.WARNING");
    assert_eq!(
        Envelope::decode(&published[0].body).unwrap(),
        Envelope::new("log", "user logged in")
    );
}

#[tokio::test]
async fn concurrent_pushes_share_one_connection() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker).await;

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let emitter = emitter.clone();
            tokio::spawn(async move { emitter.push(&format!("{{\"n\":{i}}}"), "log.INFO").await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(broker.dial_count(), 1);
    assert_eq!(broker.published().len(), 50);
    assert_eq!(broker.open_channels(), 0);
}
