//! # Event Relay Runtime
//!
//! Runtime components of the event relay.
//!
//! ## Core Components
//!
//! - **Connection Manager**: dials the broker once at startup with bounded
//!   quadratic backoff ([`connection`])
//! - **Topology**: idempotent declaration of the topic exchange ([`topology`])
//! - **Emitter**: channel-per-publish producer ([`emitter`])
//! - **Consumer**: anonymous queue, topic bindings and a non-blocking pull loop
//!   ([`consumer`])
//! - **Dispatcher**: routes envelopes by name to the downstream sink ([`dispatch`])
//!
//! ## Example
//!
//! ```ignore
//! use event_relay_runtime::{ConnectionManager, Consumer, Dispatcher, HttpLogSink};
//!
//! let manager = ConnectionManager::new(connector, &config.retry);
//! let connection = manager.connect(&config.broker_url).await?;
//!
//! let dispatcher = Arc::new(Dispatcher::new(Arc::new(HttpLogSink::new(&config.logger_url))));
//! let consumer = Consumer::from_config(connection, dispatcher, &config).await?;
//! consumer.listen(config.topics.as_slice()).await?;
//! ```

/// Connection Manager with startup retry
pub mod connection;

/// Event Consumer
pub mod consumer;

/// Dispatch and handler routing
pub mod dispatch;

/// Event Emitter
pub mod emitter;

/// HTTP logging sink
pub mod http_sink;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with backoff
pub mod retry;

/// Dispatch counters
pub mod stats;

/// Exchange declaration
pub mod topology;

pub use connection::ConnectionManager;
pub use consumer::Consumer;
pub use dispatch::{Dispatcher, Route};
pub use emitter::Emitter;
pub use http_sink::HttpLogSink;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use stats::{DispatchStats, StatsSnapshot};
