//! Broker service.
//!
//! Connects to RabbitMQ (retrying with quadratic backoff), then serves the
//! broker HTTP API. `log` submissions are published to `logs_topic` under
//! `log.INFO`.
//!
//! Environment:
//! - `CONNECTION_STRING` / `CONNECTION-STRING`: AMQP URL
//! - `WEB_PORT`: HTTP port (default 80)
//! - `RUST_LOG`: log filter (default `info`)

use anyhow::Context;
use event_relay_core::config::RelayConfig;
use event_relay_core::transport::BrokerConnection;
use event_relay_rabbitmq::AmqpConnector;
use event_relay_runtime::metrics::MetricsServer;
use event_relay_runtime::{ConnectionManager, Emitter};
use event_relay_web::{AppState, router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_WEB_PORT: u16 = 80;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = RelayConfig::from_env().context("Invalid relay configuration")?;
    let addr = SocketAddr::from(([0, 0, 0, 0], web_port()?));

    let mut metrics = MetricsServer::new(addr);
    metrics.start().context("Failed to install metrics recorder")?;

    let connector = AmqpConnector::new().with_connection_name("broker-service");
    let manager = ConnectionManager::new(Arc::new(connector), &config.retry);
    let connection = match manager.connect(&config.broker_url).await {
        Ok(connection) => connection,
        Err(e) => {
            error!(error = %e, "Could not connect to the message broker, exiting");
            std::process::exit(1);
        }
    };

    let emitter = Emitter::with_exchange(Arc::clone(&connection), config.exchange.clone())
        .await
        .context("Failed to declare exchange")?;

    let mut state = AppState::new(emitter);
    if let Some(handle) = metrics.handle() {
        state = state.with_metrics(handle.clone());
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, exchange = %config.exchange, "Starting broker service");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    close_connection(connection.as_ref()).await;
    info!("Broker service stopped");
    Ok(())
}

fn web_port() -> anyhow::Result<u16> {
    match std::env::var("WEB_PORT") {
        Ok(port) => port
            .parse()
            .with_context(|| format!("WEB_PORT is not a valid port: {port}")),
        Err(_) => Ok(DEFAULT_WEB_PORT),
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

async fn close_connection(connection: &dyn BrokerConnection) {
    if let Err(e) = connection.close().await {
        warn!(error = %e, "Failed to close broker connection");
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
