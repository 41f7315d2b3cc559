use async_trait::async_trait;
use ckiller_ai::GeminiClient;
use ckiller_models::{CommentaryOptions, TimestampedText};

use super::CommentaryAction;
use crate::error::{WorkerError, WorkerResult};

pub struct GeminiCommentaryAction {
    gemini: GeminiClient,
}

impl GeminiCommentaryAction {
    pub fn new(gemini: GeminiClient) -> Self {
        Self { gemini }
    }
}

#[async_trait]
impl CommentaryAction for GeminiCommentaryAction {
    async fn generate(
        &self,
        description: &[TimestampedText],
        options: &CommentaryOptions,
    ) -> WorkerResult<Vec<TimestampedText>> {
        if description.is_empty() {
            return Err(WorkerError::precondition("description is empty"));
        }
        Ok(self.gemini.write_commentary(description, options).await?)
    }
}
