//! Project records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{JobEvent, JobSnapshot};
use crate::options::ProjectOptions;
use crate::step::{DescriptionStep, JobKind, VideoStep};
use crate::step_state::StepState;
use crate::text::TimestampedText;

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Generate a new random project ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `s` has the shape of a generated project id.
    pub fn is_valid(s: &str) -> bool {
        Uuid::parse_str(s).is_ok()
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub name: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for creating a project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    pub source_url: String,
    #[serde(default)]
    pub options: ProjectOptions,
}

/// Durable state of one project: artifacts, options and both job states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub options: ProjectOptions,
    #[serde(default)]
    pub description: Vec<TimestampedText>,
    #[serde(default)]
    pub commentary: Vec<TimestampedText>,
    /// Blob names of the narration clips, in commentary order
    #[serde(default)]
    pub audio_artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_artifact: Option<String>,
    #[serde(default)]
    pub description_state: StepState<DescriptionStep>,
    #[serde(default)]
    pub video_state: StepState<VideoStep>,
    /// Sequence number of the last emitted description state
    #[serde(default)]
    pub description_seq: u64,
    #[serde(default)]
    pub video_seq: u64,
}

impl ProjectRecord {
    pub fn new(id: ProjectId, request: NewProject) -> Self {
        let now = Utc::now();
        Self {
            id,
            metadata: ProjectMetadata {
                name: request.name,
                source_url: request.source_url,
                created_at: now,
                updated_at: now,
            },
            options: request.options,
            description: Vec::new(),
            commentary: Vec::new(),
            audio_artifacts: Vec::new(),
            video_artifact: None,
            description_state: StepState::new(),
            video_state: StepState::new(),
            description_seq: 0,
            video_seq: 0,
        }
    }

    /// Bump the update timestamp.
    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }

    /// Current state of one job as seen by clients.
    pub fn snapshot(&self, kind: JobKind) -> JobSnapshot {
        match kind {
            JobKind::Description => JobSnapshot::Description(self.description_state.clone()),
            JobKind::Video => JobSnapshot::Video(self.video_state.clone()),
        }
    }

    pub fn seq(&self, kind: JobKind) -> u64 {
        match kind {
            JobKind::Description => self.description_seq,
            JobKind::Video => self.video_seq,
        }
    }

    /// Advance the sequence counter of `kind` and return the new value.
    ///
    /// Called in the same update that changes the job state, so a stored
    /// state and its sequence number never disagree.
    pub fn bump_seq(&mut self, kind: JobKind) -> u64 {
        let seq = match kind {
            JobKind::Description => &mut self.description_seq,
            JobKind::Video => &mut self.video_seq,
        };
        *seq += 1;
        *seq
    }

    /// Current state of `kind` as a sequenced event.
    pub fn event(&self, kind: JobKind) -> JobEvent {
        JobEvent::new(self.id.clone(), self.seq(kind), self.snapshot(kind))
    }

    /// Whether the persisted state of `kind` is still running.
    pub fn is_running(&self, kind: JobKind) -> bool {
        let snapshot = self.snapshot(kind);
        !snapshot.is_idle() && !snapshot.is_terminal()
    }

    /// Fail every job that is neither idle nor terminal. Returns the kinds
    /// that were changed.
    pub fn fail_unfinished(&mut self, message: &str) -> Vec<JobKind> {
        let mut changed = Vec::new();

        let state = &mut self.description_state;
        if !state.is_idle() {
            let at = state.current_step();
            if state.fail(at, message) {
                self.description_seq += 1;
                changed.push(JobKind::Description);
            }
        }

        let state = &mut self.video_state;
        if !state.is_idle() {
            let at = state.current_step();
            if state.fail(at, message) {
                self.video_seq += 1;
                changed.push(JobKind::Video);
            }
        }

        if !changed.is_empty() {
            self.touch();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step_state::StepPlan;

    fn record() -> ProjectRecord {
        ProjectRecord::new(
            ProjectId::new(),
            NewProject {
                name: "demo".to_string(),
                source_url: "https://example.com/v1".to_string(),
                options: ProjectOptions::default(),
            },
        )
    }

    #[test]
    fn test_project_id() {
        let id = ProjectId::new();
        assert!(ProjectId::is_valid(id.as_str()));
        assert!(!ProjectId::is_valid("../etc"));
    }

    #[test]
    fn test_fail_unfinished_only_touches_running_jobs() {
        let mut record = record();
        let plan = StepPlan::video(true);
        record.video_state.advance(&plan, VideoStep::Preparing).unwrap();
        record
            .video_state
            .advance(&plan, VideoStep::GeneratingAudio)
            .unwrap();

        let changed = record.fail_unfinished("interrupted by server restart");
        assert_eq!(changed, vec![JobKind::Video]);
        assert!(record.description_state.is_idle());

        assert_eq!(record.seq(JobKind::Video), 1);
        assert_eq!(record.seq(JobKind::Description), 0);

        let failure = record.video_state.error().unwrap();
        assert_eq!(failure.step, VideoStep::GeneratingAudio);
        assert_eq!(failure.message, "interrupted by server restart");

        assert!(record.fail_unfinished("again").is_empty());
    }

    #[test]
    fn test_record_json_round_trips_with_missing_fields() {
        let record = record();
        let mut json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["descriptionState"]["currentStep"], "IDLE");

        let object = json.as_object_mut().unwrap();
        object.remove("videoState");
        object.remove("commentary");
        object.remove("videoSeq");
        let back: ProjectRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_event_carries_record_seq() {
        let mut record = record();
        assert_eq!(record.bump_seq(JobKind::Description), 1);
        assert_eq!(record.bump_seq(JobKind::Description), 2);

        let event = record.event(JobKind::Description);
        assert_eq!(event.seq, 2);
        assert_eq!(event.project_id, record.id);
        assert_eq!(event.kind(), JobKind::Description);
        assert_eq!(record.event(JobKind::Video).seq, 0);
    }
}
