//! Live job progress delivery.
//!
//! Job drivers publish a [`JobEvent`](ckiller_models::JobEvent) after every
//! persisted state change; the SSE endpoint subscribes per project and job.

pub mod hub;

pub use hub::{ProgressHub, DEFAULT_CHANNEL_CAPACITY};
