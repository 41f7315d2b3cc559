use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ckiller_ai::{FileState, GeminiClient, GeminiFile};
use ckiller_media::download_video;
use ckiller_models::{DescriptionOptions, ProjectId, TimestampedText};
use tracing::{debug, warn};

use super::{DescriptionAction, ProgressRelay, ProgressSender, UploadedVideo};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::security::validate_source_url;

const SOURCE_FILE: &str = "source.mp4";

/// Description pipeline backed by yt-dlp and the Gemini Files API.
pub struct GeminiDescriptionAction {
    gemini: GeminiClient,
    config: WorkerConfig,
}

impl GeminiDescriptionAction {
    pub fn new(gemini: GeminiClient, config: WorkerConfig) -> Self {
        Self { gemini, config }
    }
}

impl From<GeminiFile> for UploadedVideo {
    fn from(file: GeminiFile) -> Self {
        Self {
            name: file.name,
            uri: file.uri,
            mime_type: file.mime_type,
        }
    }
}

#[async_trait]
impl DescriptionAction for GeminiDescriptionAction {
    async fn prepare(&self, project_id: &ProjectId, url: &str) -> WorkerResult<PathBuf> {
        validate_source_url(url, &self.config.allowed_domains).map_err(WorkerError::InvalidUrl)?;

        let workspace = self.config.job_dir(project_id.as_str(), "description");
        tokio::fs::create_dir_all(&workspace).await?;
        Ok(workspace)
    }

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

    async fn upload(&self, video: &Path) -> WorkerResult<UploadedVideo> {
        let file = self.gemini.upload_file(video, "video/mp4").await?;
        Ok(file.into())
    }

    async fn process(&self, upload: &UploadedVideo) -> WorkerResult<UploadedVideo> {
        let file = self
            .gemini
            .wait_until_active(
                &upload.name,
                self.config.processing_poll_interval,
                self.config.processing_timeout,
            )
            .await?;
        Ok(file.into())
    }

    async fn generate(
        &self,
        upload: &UploadedVideo,
        options: &DescriptionOptions,
    ) -> WorkerResult<Vec<TimestampedText>> {
        let file = GeminiFile {
            name: upload.name.clone(),
            uri: upload.uri.clone(),
            mime_type: upload.mime_type.clone(),
            state: FileState::Active,
            error: None,
        };
        Ok(self.gemini.describe_video(&file, options).await?)
    }

    async fn cleanup(&self, workspace: &Path, upload: Option<&UploadedVideo>) {
        if let Some(upload) = upload {
            self.gemini.delete_file(&upload.name).await;
        }
        match tokio::fs::remove_dir_all(workspace).await {
            Ok(()) => debug!("Removed workspace {}", workspace.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", workspace.display(), e),
        }
    }
}
