//! API integration tests against an in-memory store and scripted actions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use ckiller_api::{create_router, ApiConfig, AppState};
use ckiller_models::{
    AspectRatio, CommentaryOptions, DescriptionOptions, ProjectId, TimestampedText, VideoOptions,
};
use ckiller_progress::ProgressHub;
use ckiller_storage::{BlobStore, FsBlobStore, MemoryProjectStore, ProjectRecordStore};
use ckiller_worker::actions::{
    AudioAction, CommentaryAction, ComposeRequest, DescriptionAction, NarrationTrack,
    ProgressSender, UploadedVideo, VideoAction,
};
use ckiller_worker::{JobActions, JobRunner, WorkerConfig, WorkerResult};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

// ============================================================================
// Scripted actions
// ============================================================================

struct ScriptedDescription {
    /// When set, `download` stops at 50% until notified
    gate: Option<Arc<Notify>>,
    work_dir: PathBuf,
}

#[async_trait]
impl DescriptionAction for ScriptedDescription {
    async fn prepare(&self, project_id: &ProjectId, _url: &str) -> WorkerResult<PathBuf> {
        Ok(self.work_dir.join(project_id.as_str()))
    }

    async fn download(
        &self,
        _url: &str,
        workspace: &Path,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf> {
        progress.send(0).await.ok();
        progress.send(50).await.ok();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        progress.send(100).await.ok();
        Ok(workspace.join("source.mp4"))
    }

    async fn upload(&self, _video: &Path) -> WorkerResult<UploadedVideo> {
        Ok(UploadedVideo {
            name: "files/test".to_string(),
            uri: "https://files.example.com/test".to_string(),
            mime_type: "video/mp4".to_string(),
        })
    }

    async fn process(&self, upload: &UploadedVideo) -> WorkerResult<UploadedVideo> {
        Ok(upload.clone())
    }

    async fn generate(
        &self,
        _upload: &UploadedVideo,
        _options: &DescriptionOptions,
    ) -> WorkerResult<Vec<TimestampedText>> {
        Ok(vec![
            TimestampedText::new("00:00:02", "A skateboarder drops in").unwrap(),
            TimestampedText::new("00:00:07", "They land the trick").unwrap(),
        ])
    }
}

struct EchoCommentary;

#[async_trait]
impl CommentaryAction for EchoCommentary {
    async fn generate(
        &self,
        description: &[TimestampedText],
        _options: &CommentaryOptions,
    ) -> WorkerResult<Vec<TimestampedText>> {
        Ok(description
            .iter()
            .map(|s| TimestampedText {
                timestamp: s.timestamp.clone(),
                text: format!("Watch this: {}", s.text),
            })
            .collect())
    }
}

struct BlobAudio {
    blobs: Arc<dyn BlobStore>,
}

#[async_trait]
impl AudioAction for BlobAudio {
    async fn synthesize(
        &self,
        project_id: &ProjectId,
        commentary: &[TimestampedText],
        _options: &VideoOptions,
    ) -> WorkerResult<Vec<String>> {
        let mut names = Vec::new();
        for (i, segment) in commentary.iter().enumerate() {
            let name = format!("narration_{:03}.mp3", i);
            self.blobs.save(project_id, &name, segment.text.as_bytes()).await?;
            names.push(name);
        }
        Ok(names)
    }
}

struct BlobVideo {
    blobs: Arc<dyn BlobStore>,
}

#[async_trait]
impl VideoAction for BlobVideo {
    async fn download(
        &self,
        _url: &str,
        workspace: &Path,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf> {
        progress.send(100).await.ok();
        Ok(workspace.join("source.mp4"))
    }

    async fn scale(
        &self,
        _source: &Path,
        workspace: &Path,
        _aspect: AspectRatio,
    ) -> WorkerResult<PathBuf> {
        Ok(workspace.join("scaled.mp4"))
    }

    async fn transcribe(
        &self,
        _project_id: &ProjectId,
        _narration: &[NarrationTrack],
        _playback_speed: f64,
        workspace: &Path,
    ) -> WorkerResult<PathBuf> {
        Ok(workspace.join("narration.srt"))
    }

    async fn process(
        &self,
        _project_id: &ProjectId,
        request: &ComposeRequest,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf> {
        progress.send(100).await.ok();
        Ok(request.workspace.join("output.mp4"))
    }

    async fn finalize(&self, project_id: &ProjectId, _output: &Path) -> WorkerResult<String> {
        self.blobs.save(project_id, "final.mp4", b"final video bytes").await?;
        Ok("final.mp4".to_string())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct TestApp {
    router: Router,
    store: Arc<dyn ProjectRecordStore>,
    blobs: Arc<dyn BlobStore>,
    gate: Arc<Notify>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    fn new(gated: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = ApiConfig {
            data_dir: dir.path().to_path_buf(),
            sse_heartbeat: Duration::from_millis(50),
            ..Default::default()
        };
        let worker_config = WorkerConfig {
            work_dir: dir.path().join("work"),
            ..Default::default()
        };

        let store: Arc<dyn ProjectRecordStore> = Arc::new(MemoryProjectStore::new());
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.blob_dir()));
        let hub = Arc::new(ProgressHub::new());
        let gate = Arc::new(Notify::new());

        let actions = JobActions {
            description: Arc::new(ScriptedDescription {
                gate: gated.then(|| Arc::clone(&gate)),
                work_dir: worker_config.work_dir.clone(),
            }),
            commentary: Arc::new(EchoCommentary),
            audio: Arc::new(BlobAudio {
                blobs: Arc::clone(&blobs),
            }),
            video: Arc::new(BlobVideo {
                blobs: Arc::clone(&blobs),
            }),
        };
        let runner = JobRunner::new(worker_config, Arc::clone(&store), Arc::clone(&hub), actions);
        let state = AppState::from_parts(config, Arc::clone(&store), Arc::clone(&blobs), hub, runner);

        Self {
            router: create_router(state, None),
            store,
            blobs,
            gate,
            _dir: dir,
        }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create_project(&self) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/projects",
                Some(json!({ "name": "Skate clip", "sourceUrl": "https://example.com/v1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    /// Poll the status endpoint until `predicate` holds.
    async fn poll_status<F>(&self, id: &str, kind: &str, predicate: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        let uri = format!("/api/projects/{}/jobs/{}/status", id, kind);
        for _ in 0..500 {
            let (status, body) = self.call(Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::OK);
            if predicate(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("status of {} job never matched", kind);
    }

    async fn wait_step(&self, id: &str, kind: &str, step: &str) -> Value {
        self.poll_status(id, kind, |body| current_step(body) == step).await
    }
}

fn current_step(event: &Value) -> &str {
    event["snapshot"]["state"]["currentStep"].as_str().unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(false);
    let (status, body) = app.call(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint_disabled() {
    let app = TestApp::new(false);
    let (status, _) = app.call(Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_project_crud() {
    let app = TestApp::new(false);
    let id = app.create_project().await;

    let (status, body) = app.call(Method::GET, &format!("/api/projects/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["sourceUrl"], "https://example.com/v1");
    assert_eq!(body["descriptionState"]["currentStep"], "IDLE");

    let (status, body) = app.call(Method::GET, "/api/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["videoStep"], "IDLE");

    let (status, _) = app.call(Method::DELETE, &format!("/api/projects/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::GET, &format!("/api/projects/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_project_rejects_bad_input() {
    let app = TestApp::new(false);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/projects",
            Some(json!({ "name": "x", "sourceUrl": "http://169.254.169.254/latest" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, _) = app
        .call(
            Method::POST,
            "/api/projects",
            Some(json!({
                "name": "x",
                "sourceUrl": "https://example.com/v1",
                "options": { "video": { "playbackSpeed": 4.0 } }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/projects",
            Some(json!({ "name": "  ", "sourceUrl": "https://example.com/v1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let app = TestApp::new(false);
    let missing = ProjectId::new();

    let (status, _) = app.call(Method::GET, &format!("/api/projects/{}", missing), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call(Method::GET, "/api/projects/not-a-project", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::POST, &format!("/api/projects/{}/description", missing), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let id = app.create_project().await;
    let (status, _) = app
        .call(Method::GET, &format!("/api/projects/{}/jobs/audio/status", id), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_options() {
    let app = TestApp::new(false);
    let id = app.create_project().await;
    let uri = format!("/api/projects/{}/options", id);

    let (status, body) = app
        .call(
            Method::PATCH,
            &uri,
            Some(json!({ "video": { "subtitlesEnabled": false, "aspectRatio": "1:1" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["options"]["video"]["subtitlesEnabled"], false);
    assert_eq!(body["options"]["video"]["aspectRatio"], "1:1");

    let (status, _) = app
        .call(Method::PATCH, &uri, Some(json!({ "description": { "maxSegments": 0 } })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_video_requires_commentary() {
    let app = TestApp::new(false);
    let id = app.create_project().await;

    let (status, body) = app.call(Method::POST, &format!("/api/projects/{}/video", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("commentary"));

    let (status, _) = app
        .call(Method::POST, &format!("/api/projects/{}/commentary", id), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_full_pipeline_over_http() {
    let app = TestApp::new(true);
    let id = app.create_project().await;

    let (status, body) = app
        .call(Method::POST, &format!("/api/projects/{}/description", id), None)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(current_step(&body), "IDLE");
    assert_eq!(body["seq"], 1);

    // One description job at a time.
    app.wait_step(&id, "description", "DOWNLOADING").await;
    let (status, _) = app
        .call(Method::POST, &format!("/api/projects/{}/description", id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app.call(Method::DELETE, &format!("/api/projects/{}", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.gate.notify_one();
    let done = app.wait_step(&id, "description", "COMPLETED").await;
    assert_eq!(
        done["snapshot"]["state"]["completedSteps"],
        json!(["PREPARING", "DOWNLOADING", "UPLOADING", "PROCESSING", "GENERATING"])
    );

    let (status, body) = app
        .call(Method::POST, &format!("/api/projects/{}/commentary", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["commentary"].as_array().unwrap().len(), 2);

    // The final video is not served before the video job completes.
    app.blobs
        .save(&ProjectId::from(id.as_str()), "final.mp4", b"stale")
        .await
        .unwrap();
    let (status, _) = app
        .call(Method::GET, &format!("/api/projects/{}/artifacts/final.mp4", id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call(Method::POST, &format!("/api/projects/{}/video", id), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let done = app.wait_step(&id, "video", "COMPLETED").await;
    let completed = done["snapshot"]["state"]["completedSteps"].as_array().unwrap();
    assert!(completed.contains(&json!("TRANSCRIBING")));

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/projects/{}/artifacts/final.mp4", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"final video bytes");

    let (status, _) = app
        .call(Method::GET, &format!("/api/projects/{}/artifacts/narration_001.mp3", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call(Method::GET, &format!("/api/projects/{}/artifacts/..secret", id), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_event_stream_follows_push_phase() {
    let app = TestApp::new(true);
    let id = app.create_project().await;

    let (status, _) = app
        .call(Method::POST, &format!("/api/projects/{}/description", id), None)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    app.poll_status(&id, "description", |body| {
        current_step(body) == "DOWNLOADING" && body["snapshot"]["state"]["progress"] == 50
    })
    .await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/projects/{}/jobs/description/events", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    app.gate.notify_one();
    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream did not close after leaving the push phase")
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("event: state"));
    assert!(text.contains("\"progress\":100"));
    assert!(text.contains("\"currentStep\":\"UPLOADING\""));
    assert!(!text.contains("\"currentStep\":\"PROCESSING\""));

    let record = app
        .store
        .get(&ProjectId::from(id.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert!(record.description_seq >= 5);
}

#[tokio::test]
async fn test_event_stream_of_finished_job_closes_immediately() {
    let app = TestApp::new(false);
    let id = app.create_project().await;

    app.call(Method::POST, &format!("/api/projects/{}/description", id), None)
        .await;
    let done = app.wait_step(&id, "description", "COMPLETED").await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/projects/{}/jobs/description/events", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert_eq!(text.matches("event: state").count(), 1);
    assert!(text.contains(&format!("id: {}", done["seq"])));
    assert!(text.contains("\"currentStep\":\"COMPLETED\""));
}

#[tokio::test]
async fn test_event_stream_repeats_snapshot_while_downloading() {
    let app = TestApp::new(true);
    let id = app.create_project().await;

    app.call(Method::POST, &format!("/api/projects/{}/description", id), None)
        .await;
    let downloading = app
        .poll_status(&id, "description", |body| {
            current_step(body) == "DOWNLOADING" && body["snapshot"]["state"]["progress"] == 50
        })
        .await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/projects/{}/jobs/description/events", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Several heartbeat periods pass while the download is held.
    tokio::time::sleep(Duration::from_millis(300)).await;
    app.gate.notify_one();

    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let repeated = format!("id: {}\n", downloading["seq"]);
    assert!(
        text.matches(&repeated).count() >= 3,
        "expected heartbeats in:\n{}",
        text
    );
    assert!(text.contains("\"currentStep\":\"UPLOADING\""));
}
