//! External actions invoked by the job drivers.
//!
//! Each trait method performs the work of exactly one step. Drivers own the
//! step state; actions never see it and report percentages through an mpsc
//! sender when their step supports progress.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ckiller_models::{
    AspectRatio, CommentaryOptions, DescriptionOptions, ProjectId, TimestampedText, VideoOptions,
};
use tokio::sync::mpsc;

use crate::error::WorkerResult;

mod audio;
mod commentary;
mod description;
mod video;

pub use audio::{narration_blob_name, SpeechAudioAction};
pub use commentary::GeminiCommentaryAction;
pub use description::GeminiDescriptionAction;
pub use video::{MediaVideoAction, FINAL_VIDEO_BLOB};

/// Progress percentages reported by an action.
pub type ProgressSender = mpsc::Sender<u8>;

/// A video accepted by the AI service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedVideo {
    /// Provider resource name
    pub name: String,
    pub uri: String,
    pub mime_type: String,
}

/// A narration clip and where it starts on the source timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationTrack {
    /// Blob name within the project
    pub artifact: String,
    pub start_secs: f64,
}

/// Inputs of the final composition.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub video: PathBuf,
    pub narration: Vec<NarrationTrack>,
    pub subtitles: Option<PathBuf>,
    pub options: VideoOptions,
    pub workspace: PathBuf,
}

/// Steps of the description pipeline.
#[async_trait]
pub trait DescriptionAction: Send + Sync {
    /// Validate the source and create the job workspace.
    async fn prepare(&self, project_id: &ProjectId, url: &str) -> WorkerResult<PathBuf>;

    async fn download(
        &self,
        url: &str,
        workspace: &Path,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf>;

    async fn upload(&self, video: &Path) -> WorkerResult<UploadedVideo>;

    /// Wait until the service can read the upload.
    async fn process(&self, upload: &UploadedVideo) -> WorkerResult<UploadedVideo>;

    async fn generate(
        &self,
        upload: &UploadedVideo,
        options: &DescriptionOptions,
    ) -> WorkerResult<Vec<TimestampedText>>;

    /// Release local and remote resources. Runs whatever the outcome.
    async fn cleanup(&self, _workspace: &Path, _upload: Option<&UploadedVideo>) {}
}

#[async_trait]
pub trait CommentaryAction: Send + Sync {
    async fn generate(
        &self,
        description: &[TimestampedText],
        options: &CommentaryOptions,
    ) -> WorkerResult<Vec<TimestampedText>>;
}

#[async_trait]
pub trait AudioAction: Send + Sync {
    /// Synthesize one narration clip per commentary segment and return
    /// their blob names in commentary order.
    async fn synthesize(
        &self,
        project_id: &ProjectId,
        commentary: &[TimestampedText],
        options: &VideoOptions,
    ) -> WorkerResult<Vec<String>>;
}

/// Steps of the video pipeline after narration exists.
#[async_trait]
pub trait VideoAction: Send + Sync {
    async fn download(
        &self,
        url: &str,
        workspace: &Path,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf>;

    async fn scale(
        &self,
        source: &Path,
        workspace: &Path,
        aspect: AspectRatio,
    ) -> WorkerResult<PathBuf>;

    /// Transcribe the narration and write an SRT file for burn-in.
    ///
    /// Cues are placed on the output timeline: clip starts are divided by
    /// `playback_speed`, narration itself is not sped up.
    async fn transcribe(
        &self,
        project_id: &ProjectId,
        narration: &[NarrationTrack],
        playback_speed: f64,
        workspace: &Path,
    ) -> WorkerResult<PathBuf>;

    async fn process(
        &self,
        project_id: &ProjectId,
        request: &ComposeRequest,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf>;

    /// Move the composed video into the blob store and return its name.
    async fn finalize(&self, project_id: &ProjectId, output: &Path) -> WorkerResult<String>;

    async fn cleanup(&self, _workspace: &Path) {}
}

/// Relays an action's percentage callback into a progress channel.
///
/// The callback never blocks. When the channel is full the value is folded
/// into a running maximum that rides along with the next successful send,
/// and [`ProgressRelay::flush`] delivers it if nothing else did.
pub(crate) struct ProgressRelay {
    progress: ProgressSender,
    max: Arc<AtomicU8>,
    pending: Arc<AtomicBool>,
}

impl ProgressRelay {
    pub(crate) fn new(progress: ProgressSender) -> Self {
        Self {
            progress,
            max: Arc::new(AtomicU8::new(0)),
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn callback(&self) -> impl Fn(u8) + Send + 'static {
        let progress = self.progress.clone();
        let max = Arc::clone(&self.max);
        let pending = Arc::clone(&self.pending);
        move |value| {
            let value = max.fetch_max(value, Ordering::AcqRel).max(value);
            match progress.try_send(value) {
                Ok(()) => pending.store(false, Ordering::Release),
                Err(_) => pending.store(true, Ordering::Release),
            }
        }
    }

    /// Deliver the highest value if the last report was dropped.
    pub(crate) async fn flush(self) {
        if self.pending.swap(false, Ordering::AcqRel) {
            let _ = self.progress.send(self.max.load(Ordering::Acquire)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_channel_still_delivers_final_value() {
        let (tx, mut rx) = mpsc::channel(4);
        let relay = ProgressRelay::new(tx);
        let report = relay.callback();
        for value in 1..=100 {
            report(value);
        }
        drop(report);

        let flush = tokio::spawn(relay.flush());
        let mut received = Vec::new();
        while let Some(value) = rx.recv().await {
            received.push(value);
        }
        flush.await.unwrap();

        assert_eq!(received, [1, 2, 3, 4, 100]);
    }

    #[tokio::test]
    async fn test_send_after_drop_carries_running_max() {
        let (tx, mut rx) = mpsc::channel(1);
        let relay = ProgressRelay::new(tx);
        let report = relay.callback();
        report(10);
        report(80);
        assert_eq!(rx.recv().await, Some(10));

        report(20);
        assert_eq!(rx.recv().await, Some(80));

        relay.flush().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_flush_is_noop_when_nothing_was_dropped() {
        let (tx, mut rx) = mpsc::channel(8);
        let relay = ProgressRelay::new(tx);
        let report = relay.callback();
        report(30);
        report(60);
        relay.flush().await;
        drop(report);

        assert_eq!(rx.recv().await, Some(30));
        assert_eq!(rx.recv().await, Some(60));
        assert_eq!(rx.recv().await, None);
    }
}
