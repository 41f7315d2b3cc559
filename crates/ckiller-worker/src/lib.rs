//! Generation job worker.
//!
//! This crate provides:
//! - Step drivers that persist every transition before publishing it
//! - The description and video job step sequences
//! - Pipeline actions backed by Gemini, OpenAI and FFmpeg
//! - A job runner that enforces one running job per project and kind

pub mod actions;
pub mod config;
pub mod driver;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod runner;
pub mod security;

#[cfg(test)]
pub(crate) mod test_support;

pub use actions::{
    AudioAction, CommentaryAction, DescriptionAction, GeminiCommentaryAction,
    GeminiDescriptionAction, MediaVideoAction, SpeechAudioAction, VideoAction, FINAL_VIDEO_BLOB,
};
pub use config::WorkerConfig;
pub use driver::{JobOutcome, RecordStep, StepDriver};
pub use error::{WorkerError, WorkerResult};
pub use jobs::{run_description_steps, run_video_steps, DescriptionJob, JobDeadline, VideoJob};
pub use logging::JobLogger;
pub use runner::{ActiveJobs, JobActions, JobRunner, JobSlot, INTERRUPTED_MESSAGE};
pub use security::validate_source_url;
