//! Application state.

use std::sync::Arc;

use ckiller_ai::{AiConfig, GeminiClient, OpenAiClient};
use ckiller_progress::ProgressHub;
use ckiller_storage::{BlobStore, FsBlobStore, ProjectRecordStore, SqliteProjectStore};
use ckiller_worker::{
    GeminiCommentaryAction, GeminiDescriptionAction, JobActions, JobRunner, MediaVideoAction,
    SpeechAudioAction, WorkerConfig,
};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn ProjectRecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub hub: Arc<ProgressHub>,
    pub runner: JobRunner,
}

impl AppState {
    /// Create new application state backed by SQLite, the local blob store
    /// and the configured AI providers.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let worker_config = WorkerConfig::from_env();
        let ai_config = AiConfig::from_env();

        let store: Arc<dyn ProjectRecordStore> =
            Arc::new(SqliteProjectStore::connect(&config.database_url).await?);
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.blob_dir()));
        let hub = Arc::new(ProgressHub::new());

        let gemini = GeminiClient::new(&ai_config)?;
        let openai = OpenAiClient::new(&ai_config)?;
        let actions = JobActions {
            description: Arc::new(GeminiDescriptionAction::new(gemini.clone(), worker_config.clone())),
            commentary: Arc::new(GeminiCommentaryAction::new(gemini)),
            audio: Arc::new(SpeechAudioAction::new(openai.clone(), Arc::clone(&blobs))),
            video: Arc::new(MediaVideoAction::new(openai, Arc::clone(&blobs), &worker_config)),
        };

        let runner = JobRunner::new(worker_config, Arc::clone(&store), Arc::clone(&hub), actions);
        Ok(Self::from_parts(config, store, blobs, hub, runner))
    }

    /// Assemble state from already-built components.
    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn ProjectRecordStore>,
        blobs: Arc<dyn BlobStore>,
        hub: Arc<ProgressHub>,
        runner: JobRunner,
    ) -> Self {
        Self {
            config,
            store,
            blobs,
            hub,
            runner,
        }
    }
}
