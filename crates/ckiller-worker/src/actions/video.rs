use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ckiller_ai::OpenAiClient;
use ckiller_media::{
    compose_video, download_video, scale_to_aspect, write_srt, BurnSubtitles, ComposeSettings,
    FfmpegRunner, NarrationClip, SubtitleCue,
};
use ckiller_models::{AspectRatio, ProjectId};
use ckiller_storage::BlobStore;
use tracing::{debug, info, warn};

use super::{ComposeRequest, NarrationTrack, ProgressRelay, ProgressSender, VideoAction};
use crate::config::WorkerConfig;
use crate::error::WorkerResult;

const SOURCE_FILE: &str = "source.mp4";
const SCALED_FILE: &str = "scaled.mp4";
const SUBTITLES_FILE: &str = "narration.srt";
const OUTPUT_FILE: &str = "output.mp4";

/// Blob name of the composed video.
pub const FINAL_VIDEO_BLOB: &str = "final.mp4";

/// Video pipeline backed by yt-dlp, FFmpeg and OpenAI transcription.
pub struct MediaVideoAction {
    openai: OpenAiClient,
    blobs: Arc<dyn BlobStore>,
    runner: FfmpegRunner,
}

impl MediaVideoAction {
    pub fn new(openai: OpenAiClient, blobs: Arc<dyn BlobStore>, config: &WorkerConfig) -> Self {
        Self {
            openai,
            blobs,
            runner: FfmpegRunner::new().with_timeout(config.ffmpeg_timeout_secs),
        }
    }
}

#[async_trait]
impl VideoAction for MediaVideoAction {
    async fn download(
        &self,
        url: &str,
        workspace: &Path,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf> {
        let output = workspace.join(SOURCE_FILE);
        let relay = ProgressRelay::new(progress);
        download_video(url, &output, relay.callback()).await?;
        relay.flush().await;
        Ok(output)
    }

    async fn scale(
        &self,
        source: &Path,
        workspace: &Path,
        aspect: AspectRatio,
    ) -> WorkerResult<PathBuf> {
        let output = workspace.join(SCALED_FILE);
        scale_to_aspect(&self.runner, source, &output, aspect).await?;
        Ok(output)
    }

    async fn transcribe(
        &self,
        project_id: &ProjectId,
        narration: &[NarrationTrack],
        playback_speed: f64,
        workspace: &Path,
    ) -> WorkerResult<PathBuf> {
        let mut cues = Vec::new();
        for track in narration {
            let path = self.blobs.path(project_id, &track.artifact)?;
            let transcription = self.openai.transcribe(&path).await?;
            let offset = track.start_secs / playback_speed;
            cues.extend(transcription.segments.into_iter().map(|segment| {
                SubtitleCue::new(segment.start, segment.end, segment.text.trim()).shifted(offset)
            }));
        }

        let output = workspace.join(SUBTITLES_FILE);
        write_srt(&output, &cues).await?;
        info!("Wrote {} subtitle cues", cues.len());
        Ok(output)
    }

    async fn process(
        &self,
        project_id: &ProjectId,
        request: &ComposeRequest,
        progress: ProgressSender,
    ) -> WorkerResult<PathBuf> {
        let mut clips = Vec::with_capacity(request.narration.len());
        for track in &request.narration {
            clips.push(NarrationClip {
                path: self.blobs.path(project_id, &track.artifact)?,
                start_secs: track.start_secs,
            });
        }

        let options = &request.options;
        let settings = ComposeSettings {
            playback_speed: options.playback_speed,
            original_volume: options.original_volume,
            narration_volume: options.narration_volume,
            subtitles: request.subtitles.as_ref().map(|path| BurnSubtitles {
                path: path.clone(),
                font_size: options.subtitle_font_size,
            }),
        };

        let output = request.workspace.join(OUTPUT_FILE);
        let relay = ProgressRelay::new(progress);
        compose_video(
            &self.runner,
            &request.video,
            &clips,
            &settings,
            &output,
            relay.callback(),
        )
        .await?;
        relay.flush().await;
        Ok(output)
    }

    async fn finalize(&self, project_id: &ProjectId, output: &Path) -> WorkerResult<String> {
        self.blobs.import(project_id, FINAL_VIDEO_BLOB, output).await?;
        debug!("Stored {} for project {}", FINAL_VIDEO_BLOB, project_id);
        Ok(FINAL_VIDEO_BLOB.to_string())
    }

    async fn cleanup(&self, workspace: &Path) {
        match tokio::fs::remove_dir_all(workspace).await {
            Ok(()) => debug!("Removed workspace {}", workspace.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", workspace.display(), e),
        }
    }
}
