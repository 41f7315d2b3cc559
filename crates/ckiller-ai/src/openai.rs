//! OpenAI client: speech synthesis and transcription.

use std::path::Path;

use ckiller_models::Voice;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AiConfig;
use crate::error::{error_message, AiError, AiResult};
use crate::retry::{retry_async, RetryConfig};

const PROVIDER: &str = "OpenAI";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// A transcribed span, in seconds relative to the start of the audio.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    tts_model: String,
    transcribe_model: String,
    retry: RetryConfig,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig) -> AiResult<Self> {
        if config.openai_api_key.is_empty() {
            return Err(AiError::config_error("OPENAI_API_KEY not set"));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.clone(),
            tts_model: config.openai_tts_model.clone(),
            transcribe_model: config.openai_transcribe_model.clone(),
            retry: RetryConfig::new("openai").with_max_retries(config.max_retries),
        })
    }

    async fn check(response: Response) -> AiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AiError::api(PROVIDER, status.as_u16(), error_message(&body)))
    }

    /// Synthesize `text` as MP3 audio.
    pub async fn synthesize_speech(&self, text: &str, voice: Voice) -> AiResult<Vec<u8>> {
        let request = SpeechRequest {
            model: &self.tts_model,
            input: text,
            voice: voice.as_str(),
            response_format: "mp3",
        };
        let url = format!("{}/v1/audio/speech", self.base_url);

        let bytes = retry_async(&self.retry, || async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await?;
            Ok::<_, AiError>(Self::check(response).await?.bytes().await?)
        })
        .await?;

        if bytes.is_empty() {
            return Err(AiError::invalid_response("empty audio response"));
        }
        debug!("Synthesized {} bytes of speech", bytes.len());
        Ok(bytes.to_vec())
    }

    /// Transcribe an audio file with segment timestamps.
    pub async fn transcribe(&self, path: &Path) -> AiResult<Transcription> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.mp3".to_string());
        let url = format!("{}/v1/audio/transcriptions", self.base_url);

        info!("Transcribing {}", path.display());

        retry_async(&self.retry, || async {
            let file = Part::bytes(data.clone())
                .file_name(file_name.clone())
                .mime_str("audio/mpeg")?;
            let form = Form::new()
                .part("file", file)
                .text("model", self.transcribe_model.clone())
                .text("response_format", "verbose_json")
                .text("timestamp_granularities[]", "segment");

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .multipart(form)
                .send()
                .await?;
            Ok::<_, AiError>(Self::check(response).await?.json().await?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(&AiConfig::with_base_url(&server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_synthesize_speech() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(header("authorization", "Bearer test-openai-key"))
            .and(body_partial_json(serde_json::json!({
                "input": "Hello there",
                "voice": "nova",
                "response_format": "mp3"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3audio".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let audio = client(&server)
            .synthesize_speech("Hello there", Voice::Nova)
            .await
            .unwrap();
        assert_eq!(audio, b"ID3audio");
    }

    #[tokio::test]
    async fn test_rate_limit_message_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "rate limit exceeded", "type": "requests" }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .synthesize_speech("Hello", Voice::Alloy)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().ends_with("rate limit exceeded"));
    }

    #[tokio::test]
    async fn test_transcribe_sends_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(body_string_contains("verbose_json"))
            .and(body_string_contains("narration_000.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "Hello there. General.",
                "duration": 2.4,
                "segments": [
                    { "id": 0, "start": 0.0, "end": 1.2, "text": " Hello there." },
                    { "id": 1, "start": 1.2, "end": 2.4, "text": " General." }
                ]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("narration_000.mp3");
        std::fs::write(&audio, b"ID3audio").unwrap();

        let transcription = client(&server).transcribe(&audio).await.unwrap();
        assert_eq!(transcription.segments.len(), 2);
        assert_eq!(transcription.segments[1].start, 1.2);
    }
}
