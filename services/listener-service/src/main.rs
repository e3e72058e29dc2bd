//! Listener service.
//!
//! Connects to RabbitMQ (retrying with quadratic backoff), binds an anonymous
//! queue to `log.INFO`, `log.WARNING` and `log.ERROR` on `logs_topic`, and
//! forwards every consumed envelope to the logger service.
//!
//! Environment:
//! - `CONNECTION_STRING` / `CONNECTION-STRING`: AMQP URL
//! - `LOGGER_URL` / `LOGGER-URL`: logger endpoint
//! - `RELAY_TOPICS`, `RELAY_MAX_IN_FLIGHT`, `RELAY_ACK_MODE`: consumer tuning
//! - `METRICS_ADDR`: optional Prometheus listener, e.g. `0.0.0.0:9090`
//! - `RUST_LOG`: log filter (default `info`)

use anyhow::Context;
use event_relay_core::config::RelayConfig;
use event_relay_rabbitmq::AmqpConnector;
use event_relay_runtime::metrics::MetricsServer;
use event_relay_runtime::{ConnectionManager, Consumer, Dispatcher, HttpLogSink};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SINK_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = RelayConfig::from_env().context("Invalid relay configuration")?;

    if let Some(addr) = metrics_addr()? {
        MetricsServer::new(addr)
            .start_with_listener()
            .context("Failed to start metrics listener")?;
    }

    let connector = AmqpConnector::new().with_connection_name("listener-service");
    let manager = ConnectionManager::new(Arc::new(connector), &config.retry);
    let connection = match manager.connect(&config.broker_url).await {
        Ok(connection) => connection,
        Err(e) => {
            error!(error = %e, "Could not connect to the message broker, exiting");
            std::process::exit(1);
        }
    };

    let sink = HttpLogSink::with_timeout(config.logger_url.clone(), SINK_TIMEOUT)?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(sink)));
    let consumer = Consumer::from_config(Arc::clone(&connection), dispatcher, &config)
        .await
        .context("Failed to create consumer")?;

    info!(
        logger_url = %config.logger_url,
        topics = ?config.topics,
        "Listening for and consuming RabbitMQ messages"
    );

    let result = consumer
        .listen_until(config.topics.as_slice(), shutdown_signal())
        .await;

    let stats = consumer.stats().snapshot();
    info!(
        received = stats.received,
        forwarded = stats.forwarded,
        skipped = stats.skipped,
        sink_failures = stats.sink_failures,
        decode_failures = stats.decode_failures,
        "Listener stopped"
    );

    if let Err(e) = connection.close().await {
        warn!(error = %e, "Failed to close broker connection");
    }

    result.context("Consumer stopped on a transport error")
}

fn metrics_addr() -> anyhow::Result<Option<SocketAddr>> {
    match std::env::var("METRICS_ADDR") {
        Ok(addr) if !addr.trim().is_empty() => addr
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("METRICS_ADDR is not a socket address: {addr}")),
        _ => Ok(None),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for shutdown signal, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
