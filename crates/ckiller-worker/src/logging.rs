//! Structured job logging utilities.

use ckiller_models::{JobKind, ProjectId};
use tracing::{error, info, warn, Span};

/// Job logger carrying the project and job kind on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    project_id: String,
    job: JobKind,
}

impl JobLogger {
    pub fn new(project_id: &ProjectId, job: JobKind) -> Self {
        Self {
            project_id: project_id.to_string(),
            job,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            project_id = %self.project_id,
            job = %self.job,
            "Job started: {}", message
        );
    }

    /// Log a step transition.
    pub fn log_step(&self, step: &str) {
        info!(
            project_id = %self.project_id,
            job = %self.job,
            step,
            "Job step: {}", step
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            project_id = %self.project_id,
            job = %self.job,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            project_id = %self.project_id,
            job = %self.job,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            project_id = %self.project_id,
            job = %self.job,
            "Job completed: {}", message
        );
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn job(&self) -> JobKind {
        self.job
    }

    /// Span wrapping the whole job task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            project_id = %self.project_id,
            job = %self.job
        )
    }
}
