//! AI provider configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_tts_model: String,
    pub openai_transcribe_model: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Retries for rate-limited or unavailable provider calls
    pub max_retries: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com".to_string(),
            openai_tts_model: "tts-1".to_string(),
            openai_transcribe_model: "whisper-1".to_string(),
            request_timeout: Duration::from_secs(600),
            max_retries: 3,
        }
    }
}

impl AiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or(defaults.gemini_base_url)
                .trim_end_matches('/')
                .to_string(),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or(defaults.openai_base_url)
                .trim_end_matches('/')
                .to_string(),
            openai_tts_model: std::env::var("OPENAI_TTS_MODEL").unwrap_or(defaults.openai_tts_model),
            openai_transcribe_model: std::env::var("OPENAI_TRANSCRIBE_MODEL")
                .unwrap_or(defaults.openai_transcribe_model),
            request_timeout: Duration::from_secs(
                std::env::var("AI_REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            max_retries: std::env::var("AI_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }

    /// Config pointing both providers at a single base URL, for tests.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            gemini_api_key: "test-gemini-key".to_string(),
            gemini_base_url: base_url.to_string(),
            openai_api_key: "test-openai-key".to_string(),
            openai_base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(10),
            max_retries: 0,
            ..Default::default()
        }
    }
}
