//! Job snapshots and progress events delivered to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::project::ProjectId;
use crate::step::{DescriptionStep, JobKind, JobStep, VideoStep};
use crate::step_state::StepState;

/// State of one job, tagged with its kind.
///
/// Wire shape: `{"kind": "description", "state": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "lowercase")]
pub enum JobSnapshot {
    Description(StepState<DescriptionStep>),
    Video(StepState<VideoStep>),
}

impl JobSnapshot {
    pub fn kind(&self) -> JobKind {
        match self {
            JobSnapshot::Description(_) => JobKind::Description,
            JobSnapshot::Video(_) => JobKind::Video,
        }
    }

    pub fn is_idle(&self) -> bool {
        match self {
            JobSnapshot::Description(s) => s.is_idle(),
            JobSnapshot::Video(s) => s.is_idle(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            JobSnapshot::Description(s) => s.is_terminal(),
            JobSnapshot::Video(s) => s.is_terminal(),
        }
    }

    pub fn in_push_phase(&self) -> bool {
        match self {
            JobSnapshot::Description(s) => s.in_push_phase(),
            JobSnapshot::Video(s) => s.in_push_phase(),
        }
    }

    /// Wire name of the current step.
    pub fn current_step(&self) -> &'static str {
        match self {
            JobSnapshot::Description(s) => s.current_step().as_str(),
            JobSnapshot::Video(s) => s.current_step().as_str(),
        }
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            JobSnapshot::Description(s) => s.progress(),
            JobSnapshot::Video(s) => s.progress(),
        }
    }

    /// Failed step and message, if the job failed.
    pub fn failure(&self) -> Option<(&'static str, &str)> {
        match self {
            JobSnapshot::Description(s) => s.error().map(|e| (e.step.as_str(), e.message.as_str())),
            JobSnapshot::Video(s) => s.error().map(|e| (e.step.as_str(), e.message.as_str())),
        }
    }
}

impl From<StepState<DescriptionStep>> for JobSnapshot {
    fn from(state: StepState<DescriptionStep>) -> Self {
        JobSnapshot::Description(state)
    }
}

impl From<StepState<VideoStep>> for JobSnapshot {
    fn from(state: StepState<VideoStep>) -> Self {
        JobSnapshot::Video(state)
    }
}

/// A sequenced snapshot emitted whenever a job's state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub project_id: ProjectId,
    /// Per-job counter, strictly increasing by one per emitted change
    pub seq: u64,
    pub snapshot: JobSnapshot,
    pub emitted_at: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(project_id: ProjectId, seq: u64, snapshot: JobSnapshot) -> Self {
        Self {
            project_id,
            seq,
            snapshot,
            emitted_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.snapshot.kind()
    }
}
