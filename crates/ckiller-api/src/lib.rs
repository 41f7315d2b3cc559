//! Axum HTTP API server.
//!
//! This crate provides:
//! - Project CRUD and job start endpoints
//! - Job status polling and server-sent job events
//! - Artifact downloads
//! - Prometheus metrics and request middleware

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
