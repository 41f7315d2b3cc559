//! AI provider clients.
//!
//! - [`GeminiClient`]: video upload, processing poll, description and commentary
//! - [`OpenAiClient`]: narration speech synthesis and transcription

pub mod config;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod retry;

pub use config::AiConfig;
pub use error::{AiError, AiResult};
pub use gemini::{FileState, GeminiClient, GeminiFile};
pub use openai::{OpenAiClient, TranscriptSegment, Transcription};
pub use retry::{retry_async, RetryConfig};
