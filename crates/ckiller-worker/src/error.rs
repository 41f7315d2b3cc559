//! Worker error types.

use ckiller_models::TransitionError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// A pipeline action failed; the message is shown to users as-is.
    #[error("{0}")]
    ActionFailed(String),

    #[error("{0}")]
    Precondition(String),

    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(#[from] ckiller_models::OptionsError),

    #[error("A {0} job is already running for this project")]
    AlreadyRunning(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid state transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] ckiller_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] ckiller_media::MediaError),

    #[error("{0}")]
    Ai(#[from] ckiller_ai::AiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn action_failed(msg: impl Into<String>) -> Self {
        Self::ActionFailed(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Message recorded in the failed step's `error`.
    pub fn failure_message(&self) -> String {
        match self {
            WorkerError::Media(e) => e.summary(),
            other => other.to_string(),
        }
    }

    /// Whether the job can no longer persist its own state.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, WorkerError::Storage(_))
    }
}
