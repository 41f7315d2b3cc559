//! Client for the Content Killer API.
//!
//! This crate provides:
//! - A typed HTTP client for projects, jobs and artifacts
//! - A job watcher combining status polling with the server-sent event
//!   channel, including reconnects with capped backoff
//! - Terminal rendering of job steps

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod push;
pub mod sse;
pub mod transport;
pub mod view;

pub use api::ApiClient;
pub use cache::StateCache;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use orchestrator::{JobWatcher, PushOutcome};
pub use push::{CloseReason, PushMachine, PushState, ReconnectConfig, RetryBudget};
pub use sse::{SseDecoder, SseMessage};
pub use transport::{EventStream, Transport};
pub use view::{render, step_rows, StepRow, StepView};
