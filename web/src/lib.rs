//! Axum front end of the broker service.
//!
//! Upstream callers submit actions over HTTP; `log` actions are published to
//! the topic exchange through the runtime's [`Emitter`](event_relay_runtime::Emitter)
//! and reach listener services by routing key.
//!
//! # Example
//!
//! ```ignore
//! use event_relay_web::{AppState, router};
//!
//! let emitter = Emitter::new(connection).await?;
//! let app = router(AppState::new(emitter));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:80").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use router::router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
