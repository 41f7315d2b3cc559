//! Job kinds and their step enumerations.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two generation pipelines a project can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Download, upload and describe the source video.
    Description,
    /// Narrate and compose the final video.
    Video,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Description => "description",
            JobKind::Video => "video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown job kind: {0}")]
pub struct UnknownJobKind(pub String);

impl FromStr for JobKind {
    type Err = UnknownJobKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "description" => Ok(JobKind::Description),
            "video" => Ok(JobKind::Video),
            other => Err(UnknownJobKind(other.to_string())),
        }
    }
}

/// A named phase of one job type.
///
/// Every step type has an initial `IDLE`, a successful terminal `COMPLETED`
/// and a failed terminal `ERROR`. The ordered steps between them are
/// described by a [`StepPlan`](crate::StepPlan).
pub trait JobStep:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Job kind this step enumeration belongs to.
    const KIND: JobKind;
    const IDLE: Self;
    const COMPLETED: Self;
    const ERROR: Self;

    /// Wire name (`SCREAMING_SNAKE_CASE`).
    fn as_str(&self) -> &'static str;

    /// Human-readable label for step lists.
    fn label(&self) -> &'static str;

    /// Whether the step reports fine-grained percentage progress.
    ///
    /// Progress-capable steps are also the push phase of the progress
    /// channel: the server streams updates while a job sits in one.
    fn supports_progress(&self) -> bool;

    fn is_terminal(&self) -> bool {
        *self == Self::COMPLETED || *self == Self::ERROR
    }
}

/// Steps of the description pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DescriptionStep {
    #[default]
    Idle,
    Preparing,
    Downloading,
    Uploading,
    Processing,
    Generating,
    Completed,
    Error,
}

impl DescriptionStep {
    /// Ordered steps executed by every description job.
    pub const SEQUENCE: [DescriptionStep; 5] = [
        DescriptionStep::Preparing,
        DescriptionStep::Downloading,
        DescriptionStep::Uploading,
        DescriptionStep::Processing,
        DescriptionStep::Generating,
    ];
}

impl JobStep for DescriptionStep {
    const KIND: JobKind = JobKind::Description;
    const IDLE: Self = DescriptionStep::Idle;
    const COMPLETED: Self = DescriptionStep::Completed;
    const ERROR: Self = DescriptionStep::Error;

    fn as_str(&self) -> &'static str {
        match self {
            DescriptionStep::Idle => "IDLE",
            DescriptionStep::Preparing => "PREPARING",
            DescriptionStep::Downloading => "DOWNLOADING",
            DescriptionStep::Uploading => "UPLOADING",
            DescriptionStep::Processing => "PROCESSING",
            DescriptionStep::Generating => "GENERATING",
            DescriptionStep::Completed => "COMPLETED",
            DescriptionStep::Error => "ERROR",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DescriptionStep::Idle => "Waiting",
            DescriptionStep::Preparing => "Preparing",
            DescriptionStep::Downloading => "Downloading video",
            DescriptionStep::Uploading => "Uploading to AI service",
            DescriptionStep::Processing => "Processing video",
            DescriptionStep::Generating => "Generating description",
            DescriptionStep::Completed => "Completed",
            DescriptionStep::Error => "Failed",
        }
    }

    fn supports_progress(&self) -> bool {
        matches!(self, DescriptionStep::Downloading)
    }
}

impl fmt::Display for DescriptionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps of the video pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStep {
    #[default]
    Idle,
    Preparing,
    GeneratingAudio,
    DownloadingVideo,
    ScalingVideo,
    Transcribing,
    ProcessingVideo,
    Finalizing,
    Completed,
    Error,
}

impl VideoStep {
    /// Ordered steps of a video job with subtitles enabled.
    pub const SEQUENCE: [VideoStep; 7] = [
        VideoStep::Preparing,
        VideoStep::GeneratingAudio,
        VideoStep::DownloadingVideo,
        VideoStep::ScalingVideo,
        VideoStep::Transcribing,
        VideoStep::ProcessingVideo,
        VideoStep::Finalizing,
    ];
}

impl JobStep for VideoStep {
    const KIND: JobKind = JobKind::Video;
    const IDLE: Self = VideoStep::Idle;
    const COMPLETED: Self = VideoStep::Completed;
    const ERROR: Self = VideoStep::Error;

    fn as_str(&self) -> &'static str {
        match self {
            VideoStep::Idle => "IDLE",
            VideoStep::Preparing => "PREPARING",
            VideoStep::GeneratingAudio => "GENERATING_AUDIO",
            VideoStep::DownloadingVideo => "DOWNLOADING_VIDEO",
            VideoStep::ScalingVideo => "SCALING_VIDEO",
            VideoStep::Transcribing => "TRANSCRIBING",
            VideoStep::ProcessingVideo => "PROCESSING_VIDEO",
            VideoStep::Finalizing => "FINALIZING",
            VideoStep::Completed => "COMPLETED",
            VideoStep::Error => "ERROR",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            VideoStep::Idle => "Waiting",
            VideoStep::Preparing => "Preparing",
            VideoStep::GeneratingAudio => "Generating narration",
            VideoStep::DownloadingVideo => "Downloading video",
            VideoStep::ScalingVideo => "Scaling video",
            VideoStep::Transcribing => "Transcribing narration",
            VideoStep::ProcessingVideo => "Composing video",
            VideoStep::Finalizing => "Finalizing",
            VideoStep::Completed => "Completed",
            VideoStep::Error => "Failed",
        }
    }

    fn supports_progress(&self) -> bool {
        matches!(self, VideoStep::DownloadingVideo | VideoStep::ProcessingVideo)
    }
}

impl fmt::Display for VideoStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
