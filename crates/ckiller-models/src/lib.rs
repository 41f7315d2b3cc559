//! Shared data models for the Content Killer backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job kinds, steps and the step state machine
//! - Project records and generation options
//! - Timestamped text segments
//! - Job snapshots and progress events

pub mod event;
pub mod options;
pub mod project;
pub mod step;
pub mod step_state;
pub mod text;

// Re-export common types
pub use event::{JobEvent, JobSnapshot};
pub use options::{
    AspectRatio, CommentaryOptions, DescriptionOptions, OptionsError, ProjectOptions, Tone,
    VideoOptions, Voice,
};
pub use project::{NewProject, ProjectId, ProjectMetadata, ProjectRecord};
pub use step::{DescriptionStep, JobKind, JobStep, UnknownJobKind, VideoStep};
pub use step_state::{StepFailure, StepPlan, StepState, TransitionError};
pub use text::{TimestampError, TimestampedText};
