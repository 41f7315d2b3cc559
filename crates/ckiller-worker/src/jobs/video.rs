//! Video job: narrate the commentary and compose the final video.

use std::path::{Path, PathBuf};

use ckiller_models::{ProjectId, TimestampedText, VideoOptions, VideoStep};
use tokio::sync::mpsc;

use super::{JobDeadline, PROGRESS_BUFFER};
use crate::actions::{AudioAction, ComposeRequest, NarrationTrack, VideoAction};
use crate::driver::StepDriver;
use crate::error::{WorkerError, WorkerResult};

/// Inputs of one video job. Commentary is read from the record while
/// `PREPARING`, so the job narrates what is stored when it starts.
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub project_id: ProjectId,
    pub source_url: String,
    pub options: VideoOptions,
    pub workspace: PathBuf,
}

/// Run every video step; the driver settles the outcome.
pub async fn run_video_steps(
    driver: &mut StepDriver<VideoStep>,
    audio: &dyn AudioAction,
    video: &dyn VideoAction,
    job: &VideoJob,
    deadline: JobDeadline,
) -> WorkerResult<()> {
    let (commentary, starts) = deadline
        .run(async {
            driver.enter(VideoStep::Preparing).await?;
            let commentary = load_commentary(driver, &job.project_id).await?;
            let starts = commentary
                .iter()
                .map(|segment| segment.seconds())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    WorkerError::precondition(format!("invalid commentary timestamp: {}", e))
                })?;
            Ok((commentary, starts))
        })
        .await?;
    tokio::fs::create_dir_all(&job.workspace).await?;

    let result = deadline
        .run(narrate(driver, audio, video, job, &commentary, &starts))
        .await;
    video.cleanup(&job.workspace).await;
    result
}

async fn load_commentary(
    driver: &StepDriver<VideoStep>,
    project_id: &ProjectId,
) -> WorkerResult<Vec<TimestampedText>> {
    let record = driver
        .store()
        .get(project_id)
        .await?
        .ok_or_else(|| WorkerError::ProjectNotFound(project_id.to_string()))?;
    if record.commentary.is_empty() {
        return Err(WorkerError::precondition("commentary is empty"));
    }
    Ok(record.commentary)
}

async fn narrate(
    driver: &mut StepDriver<VideoStep>,
    audio: &dyn AudioAction,
    video: &dyn VideoAction,
    job: &VideoJob,
    commentary: &[TimestampedText],
    starts: &[f64],
) -> WorkerResult<()> {
    let workspace: &Path = &job.workspace;
    let options = &job.options;

    driver.enter(VideoStep::GeneratingAudio).await?;
    let audio_artifacts = audio.synthesize(&job.project_id, commentary, options).await?;
    if audio_artifacts.len() != commentary.len() {
        return Err(WorkerError::action_failed(format!(
            "expected {} narration clips, got {}",
            commentary.len(),
            audio_artifacts.len()
        )));
    }
    let narration: Vec<NarrationTrack> = audio_artifacts
        .iter()
        .zip(starts)
        .map(|(artifact, start)| NarrationTrack {
            artifact: artifact.clone(),
            start_secs: *start,
        })
        .collect();

    driver.enter(VideoStep::DownloadingVideo).await?;
    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    let source = driver
        .run_with_progress(video.download(&job.source_url, workspace, tx), rx)
        .await?;

    driver.enter(VideoStep::ScalingVideo).await?;
    let scaled = video.scale(&source, workspace, options.aspect_ratio).await?;

    let subtitles = if driver.plan().contains(VideoStep::Transcribing) {
        driver.enter(VideoStep::Transcribing).await?;
        Some(
            video
                .transcribe(&job.project_id, &narration, options.playback_speed, workspace)
                .await?,
        )
    } else {
        None
    };

    driver.enter(VideoStep::ProcessingVideo).await?;
    let request = ComposeRequest {
        video: scaled,
        narration,
        subtitles,
        options: options.clone(),
        workspace: workspace.to_path_buf(),
    };
    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    let output = driver
        .run_with_progress(video.process(&job.project_id, &request, tx), rx)
        .await?;

    driver.enter(VideoStep::Finalizing).await?;
    let artifact = video.finalize(&job.project_id, &output).await?;

    driver
        .complete(move |record| {
            record.audio_artifacts = audio_artifacts;
            record.video_artifact = Some(artifact);
        })
        .await
}
