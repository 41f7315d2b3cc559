use std::sync::Arc;

use async_trait::async_trait;
use ckiller_ai::OpenAiClient;
use ckiller_models::{ProjectId, TimestampedText, VideoOptions};
use ckiller_storage::BlobStore;
use tracing::debug;

use super::AudioAction;
use crate::error::{WorkerError, WorkerResult};

/// Blob name of the narration clip for commentary segment `index`.
pub fn narration_blob_name(index: usize) -> String {
    format!("narration_{:03}.mp3", index)
}

/// Narration synthesized with OpenAI speech and stored as project blobs.
pub struct SpeechAudioAction {
    openai: OpenAiClient,
    blobs: Arc<dyn BlobStore>,
}

impl SpeechAudioAction {
    pub fn new(openai: OpenAiClient, blobs: Arc<dyn BlobStore>) -> Self {
        Self { openai, blobs }
    }
}

#[async_trait]
impl AudioAction for SpeechAudioAction {
    async fn synthesize(
        &self,
        project_id: &ProjectId,
        commentary: &[TimestampedText],
        options: &VideoOptions,
    ) -> WorkerResult<Vec<String>> {
        if commentary.is_empty() {
            return Err(WorkerError::precondition("commentary is empty"));
        }

        let mut artifacts = Vec::with_capacity(commentary.len());
        for (index, segment) in commentary.iter().enumerate() {
            let audio = self
                .openai
                .synthesize_speech(&segment.text, options.voice)
                .await?;
            let name = narration_blob_name(index);
            self.blobs.save(project_id, &name, &audio).await?;
            debug!("Stored narration clip {} ({} bytes)", name, audio.len());
            artifacts.push(name);
        }
        Ok(artifacts)
    }
}
