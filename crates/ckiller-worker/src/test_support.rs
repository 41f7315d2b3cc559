//! Scripted collaborators for job tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ckiller_models::{
    AspectRatio, CommentaryOptions, DescriptionOptions, JobEvent, JobKind, NewProject, ProjectId,
    ProjectOptions, ProjectRecord, TimestampedText, VideoOptions,
};
use ckiller_progress::ProgressHub;
use ckiller_storage::{MemoryProjectStore, ProjectRecordStore};
use tokio::sync::Notify;

use crate::actions::{
    AudioAction, CommentaryAction, ComposeRequest, DescriptionAction, NarrationTrack,
    ProgressSender, UploadedVideo, VideoAction,
};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::runner::{JobActions, JobRunner};

#[derive(Default)]
pub struct FakeDescription {
    /// Blocks `process` until notified
    pub gate: Option<Arc<Notify>>,
    pub process_delay: Option<Duration>,
    pub cleanups: AtomicUsize,
    /// Cleanups that received a finished upload
    pub uploads_released: AtomicUsize,
}

#[async_trait]
impl DescriptionAction for FakeDescription {
    async fn prepare(&self, project_id: &ProjectId, _url: &str) -> WorkerResult<PathBuf> {
        Ok(std::env::temp_dir().join(project_id.as_str()))
    }

    async fn download(
        &self,
        _url: &str,
        workspace: &Path,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf> {
        for value in [0, 25, 50, 75, 100] {
            progress.send(value).await.ok();
        }
        Ok(workspace.join("source.mp4"))
    }

    async fn upload(&self, _video: &Path) -> WorkerResult<UploadedVideo> {
        Ok(UploadedVideo {
            name: "files/abc".to_string(),
            uri: "https://files.example.com/abc".to_string(),
            mime_type: "video/mp4".to_string(),
        })
    }

    async fn process(&self, upload: &UploadedVideo) -> WorkerResult<UploadedVideo> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.process_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(upload.clone())
    }

    async fn generate(
        &self,
        _upload: &UploadedVideo,
        _options: &DescriptionOptions,
    ) -> WorkerResult<Vec<TimestampedText>> {
        Ok(vec![
            TimestampedText::new("00:00:01", "A cat walks onto the stage").unwrap(),
            TimestampedText::new("00:00:05", "The cat bows").unwrap(),
        ])
    }

    async fn cleanup(&self, _workspace: &Path, upload: Option<&UploadedVideo>) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        if upload.is_some() {
            self.uploads_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct FakeCommentary;

#[async_trait]
impl CommentaryAction for FakeCommentary {
    async fn generate(
        &self,
        description: &[TimestampedText],
        _options: &CommentaryOptions,
    ) -> WorkerResult<Vec<TimestampedText>> {
        Ok(description
            .iter()
            .map(|s| TimestampedText {
                timestamp: s.timestamp.clone(),
                text: format!("Look: {}", s.text),
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeAudio {
    pub fail_with: Option<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl AudioAction for FakeAudio {
    async fn synthesize(
        &self,
        _project_id: &ProjectId,
        commentary: &[TimestampedText],
        _options: &VideoOptions,
    ) -> WorkerResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(WorkerError::action_failed(message.clone()));
        }
        Ok((0..commentary.len()).map(|i| format!("narration_{:03}.mp3", i)).collect())
    }
}

/// Video actions that record which methods ran.
#[derive(Default)]
pub struct FakeVideo {
    pub calls: Mutex<Vec<&'static str>>,
    pub process_delay: Option<Duration>,
    pub cleanups: AtomicUsize,
}

impl FakeVideo {
    fn called(&self, name: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(name);
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VideoAction for FakeVideo {
    async fn download(
        &self,
        _url: &str,
        workspace: &Path,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf> {
        self.called("download");
        for value in [10, 100] {
            progress.send(value).await.ok();
        }
        Ok(workspace.join("source.mp4"))
    }

    async fn scale(
        &self,
        _source: &Path,
        workspace: &Path,
        _aspect: AspectRatio,
    ) -> WorkerResult<PathBuf> {
        self.called("scale");
        Ok(workspace.join("scaled.mp4"))
    }

    async fn transcribe(
        &self,
        _project_id: &ProjectId,
        _narration: &[NarrationTrack],
        _playback_speed: f64,
        workspace: &Path,
    ) -> WorkerResult<PathBuf> {
        self.called("transcribe");
        Ok(workspace.join("narration.srt"))
    }

    async fn process(
        &self,
        _project_id: &ProjectId,
        request: &ComposeRequest,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf> {
        self.called("process");
        progress.send(50).await.ok();
        if let Some(delay) = self.process_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(request.workspace.join("output.mp4"))
    }

    async fn finalize(&self, _project_id: &ProjectId, _output: &Path) -> WorkerResult<String> {
        self.called("finalize");
        Ok("final.mp4".to_string())
    }

    async fn cleanup(&self, _workspace: &Path) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub runner: JobRunner,
    pub store: Arc<dyn ProjectRecordStore>,
    pub hub: Arc<ProgressHub>,
    pub description: Arc<FakeDescription>,
    pub audio: Arc<FakeAudio>,
    pub video: Arc<FakeVideo>,
    pub work_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(description: FakeDescription, audio: FakeAudio) -> Self {
        Self::with_timeout(description, audio, Duration::from_secs(60))
    }

    pub fn with_timeout(description: FakeDescription, audio: FakeAudio, job_timeout: Duration) -> Self {
        Self::build(description, audio, FakeVideo::default(), job_timeout)
    }

    pub fn build(
        description: FakeDescription,
        audio: FakeAudio,
        video: FakeVideo,
        job_timeout: Duration,
    ) -> Self {
        let work_dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            work_dir: work_dir.path().to_path_buf(),
            job_timeout,
            ..Default::default()
        };
        let store: Arc<dyn ProjectRecordStore> = Arc::new(MemoryProjectStore::new());
        let hub = Arc::new(ProgressHub::new());
        let description = Arc::new(description);
        let audio = Arc::new(audio);
        let video = Arc::new(video);

        let actions = JobActions {
            description: description.clone(),
            commentary: Arc::new(FakeCommentary),
            audio: audio.clone(),
            video: video.clone(),
        };
        let runner = JobRunner::new(config, store.clone(), hub.clone(), actions);

        Self {
            runner,
            store,
            hub,
            description,
            audio,
            video,
            work_dir,
        }
    }

    pub async fn create_project(&self, options: ProjectOptions) -> ProjectId {
        let id = ProjectId::new();
        let mut record = ProjectRecord::new(
            id.clone(),
            NewProject {
                name: "demo".to_string(),
                source_url: "https://example.com/v1".to_string(),
                options,
            },
        );
        record.commentary = vec![
            TimestampedText::new("0:01", "First line").unwrap(),
            TimestampedText::new("0:06", "Second line").unwrap(),
        ];
        self.store.put(&record).await.unwrap();
        id
    }

    pub async fn record(&self, id: &ProjectId) -> ProjectRecord {
        self.store.get(id).await.unwrap().unwrap()
    }

    /// Poll the store until the job is terminal.
    pub async fn wait_terminal(&self, id: &ProjectId, kind: JobKind) -> ProjectRecord {
        for _ in 0..500 {
            let record = self.record(id).await;
            if record.snapshot(kind).is_terminal() && !self.runner.is_active(id, kind) {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {kind} of {id} did not finish");
    }
}

/// Receive events until the hub closes the job channel.
pub async fn collect_events(mut rx: tokio::sync::broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.recv().await {
        events.push(event);
    }
    events
}
