//! Gemini client: Files API upload, processing poll and content generation.

use std::path::Path;
use std::time::{Duration, Instant};

use ckiller_models::{CommentaryOptions, DescriptionOptions, TimestampedText};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AiConfig;
use crate::error::{error_message, AiError, AiResult};
use crate::retry::{retry_async, RetryConfig};

const PROVIDER: &str = "Gemini";

/// A file stored by the Gemini Files API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFile {
    /// Resource name, e.g. `files/abc123`
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub state: FileState,
    #[serde(default)]
    pub error: Option<FileError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    #[default]
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: GeminiFile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "file_data")]
        file_data: FileData,
    },
}

#[derive(Debug, Serialize)]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    timestamp: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SegmentsPayload {
    List(Vec<RawSegment>),
    Wrapped { segments: Vec<RawSegment> },
}

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl GeminiClient {
    pub fn new(config: &AiConfig) -> AiResult<Self> {
        if config.gemini_api_key.is_empty() {
            return Err(AiError::config_error("GEMINI_API_KEY not set"));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.clone(),
            retry: RetryConfig::new("gemini").with_max_retries(config.max_retries),
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

    /// Upload a local file with the resumable upload protocol.
    pub async fn upload_file(&self, path: &Path, mime_type: &str) -> AiResult<GeminiFile> {
        let size = tokio::fs::metadata(path).await?.len();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        info!("Uploading {} ({} bytes) to Gemini", path.display(), size);

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = Self::check(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AiError::invalid_response("missing x-goog-upload-url header"))?;

        let file = tokio::fs::File::open(path).await?;
        let response = self
            .client
            .post(upload_url)
            .header("Content-Length", size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(file)
            .send()
            .await?;
        let uploaded: UploadResponse = Self::check(response).await?.json().await?;

        debug!("Uploaded file {} ({:?})", uploaded.file.name, uploaded.file.state);
        Ok(uploaded.file)
    }

    pub async fn get_file(&self, name: &str) -> AiResult<GeminiFile> {
        retry_async(&self.retry, || async {
            let response = self
                .client
                .get(format!("{}/v1beta/{}", self.base_url, name))
                .query(&[("key", self.api_key.as_str())])
                .send()
                .await?;
            Ok::<_, AiError>(Self::check(response).await?.json().await?)
        })
        .await
    }

    /// Poll until the file leaves `PROCESSING`.
    pub async fn wait_until_active(
        &self,
        name: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> AiResult<GeminiFile> {
        let started = Instant::now();
        loop {
            let file = self.get_file(name).await?;
            match file.state {
                FileState::Active => {
                    info!("Gemini file {} is active", name);
                    return Ok(file);
                }
                FileState::Failed => {
                    let reason = file
                        .error
                        .map(|e| e.message)
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "file processing failed".to_string());
                    return Err(AiError::FileProcessing(reason));
                }
                FileState::Processing | FileState::StateUnspecified => {
                    if started.elapsed() >= timeout {
                        return Err(AiError::Timeout(timeout.as_secs()));
                    }
                    debug!("Gemini file {} still processing", name);
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    /// Best-effort removal of an uploaded file.
    pub async fn delete_file(&self, name: &str) {
        let result = self
            .client
            .delete(format!("{}/v1beta/{}", self.base_url, name))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await;
        if let Err(e) = result {
            warn!("Failed to delete Gemini file {}: {}", name, e);
        }
    }

    async fn generate(&self, parts: Vec<Part>) -> AiResult<String> {
        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response: GenerateResponse = retry_async(&self.retry, || async {
            let response = self
                .client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&request)
                .send()
                .await?;
            Ok::<_, AiError>(Self::check(response).await?.json().await?)
        })
        .await?;

        response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .find(|t| !t.trim().is_empty())
            .ok_or_else(|| AiError::invalid_response("No content in Gemini response"))
    }

    /// Describe an uploaded video as timestamped segments.
    pub async fn describe_video(
        &self,
        file: &GeminiFile,
        options: &DescriptionOptions,
    ) -> AiResult<Vec<TimestampedText>> {
        let parts = vec![
            Part::File {
                file_data: FileData {
                    mime_type: file.mime_type.clone(),
                    file_uri: file.uri.clone(),
                },
            },
            Part::Text {
                text: description_prompt(options),
            },
        ];
        let text = self.generate(parts).await?;
        let segments = parse_segments(&text, options.max_segments as usize)?;
        info!("Gemini returned {} description segments", segments.len());
        Ok(segments)
    }

    /// Write narration commentary for a timestamped description.
    pub async fn write_commentary(
        &self,
        description: &[TimestampedText],
        options: &CommentaryOptions,
    ) -> AiResult<Vec<TimestampedText>> {
        let text = self
            .generate(vec![Part::Text {
                text: commentary_prompt(description, options)?,
            }])
            .await?;
        parse_segments(&text, description.len().max(1))
    }
}

fn description_prompt(options: &DescriptionOptions) -> String {
    let mut prompt = format!(
        "Describe what happens in this video as a chronological list of at most {} segments. \
         Write in language '{}'. Return ONLY a JSON array of objects \
         {{\"timestamp\": \"HH:MM:SS\", \"text\": \"...\"}}.",
        options.max_segments, options.language
    );
    if let Some(extra) = &options.instructions {
        prompt.push_str("\nAdditional instructions: ");
        prompt.push_str(extra);
    }
    prompt
}

fn commentary_prompt(description: &[TimestampedText], options: &CommentaryOptions) -> AiResult<String> {
    let description = serde_json::to_string(description)
        .map_err(|e| AiError::invalid_response(format!("cannot encode description: {}", e)))?;
    let mut prompt = format!(
        "Write {} narration commentary for a short video, in language '{}'. \
         Use at most {} words per segment and keep each segment at the timestamp \
         of the scene it comments on. Return ONLY a JSON array of objects \
         {{\"timestamp\": \"HH:MM:SS\", \"text\": \"...\"}}.\n\nScene description:\n{}",
        options.tone.as_str(),
        options.language,
        options.max_words_per_segment,
        description
    );
    if let Some(extra) = &options.instructions {
        prompt.push_str("\nAdditional instructions: ");
        prompt.push_str(extra);
    }
    Ok(prompt)
}

/// Strip an optional markdown code fence around a JSON payload.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Parse model output into normalized, chronological segments.
pub(crate) fn parse_segments(text: &str, max_segments: usize) -> AiResult<Vec<TimestampedText>> {
    let payload: SegmentsPayload = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AiError::invalid_response(format!("Failed to parse segments JSON: {}", e)))?;
    let raw = match payload {
        SegmentsPayload::List(list) => list,
        SegmentsPayload::Wrapped { segments } => segments,
    };

    let mut segments = Vec::with_capacity(raw.len());
    for segment in raw {
        if segment.text.trim().is_empty() {
            continue;
        }
        match TimestampedText::new(&segment.timestamp, segment.text.trim()) {
            Ok(parsed) => segments.push(parsed),
            Err(e) => warn!("Skipping segment with bad timestamp '{}': {}", segment.timestamp, e),
        }
    }

    segments.sort_by(|a, b| {
        let a = a.seconds().unwrap_or(0.0);
        let b = b.seconds().unwrap_or(0.0);
        a.total_cmp(&b)
    });
    segments.truncate(max_segments);

    if segments.is_empty() {
        return Err(AiError::invalid_response("Gemini returned no usable segments"));
    }
    Ok(segments)
}
