//! HTTP request handlers.

pub mod broker;
pub mod health;

pub use broker::{JsonResponse, LogPayload, RequestPayload, handle_submission, hit_broker};
pub use health::{health_check, metrics};
