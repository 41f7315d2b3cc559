//! HTTP client for the Content Killer API.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use ckiller_models::{JobEvent, JobKind, ProjectId, ProjectOptions, ProjectRecord};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::sse::{SseDecoder, SseMessage};
use crate::transport::{EventStream, Transport};

/// Name of the SSE event carrying job state.
const STATE_EVENT: &str = "state";

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        // No overall timeout: the event stream stays open for the whole job.
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.base_url, path)
    }

    fn job_url(&self, project_id: &ProjectId, kind: JobKind, leaf: &str) -> String {
        self.url(&format!("/projects/{}/jobs/{}/{}", project_id, kind, leaf))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = check(request.timeout(self.config.request_timeout).send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn create_project(
        &self,
        name: &str,
        source_url: &str,
        options: Option<&ProjectOptions>,
    ) -> ClientResult<ProjectRecord> {
        let mut body = json!({ "name": name, "sourceUrl": source_url });
        if let Some(options) = options {
            body["options"] = serde_json::to_value(options)?;
        }
        self.send_json(self.client.post(self.url("/projects")).json(&body))
            .await
    }

    pub async fn get_project(&self, project_id: &ProjectId) -> ClientResult<ProjectRecord> {
        let url = self.url(&format!("/projects/{}", project_id));
        self.send_json(self.client.get(url)).await
    }

    pub async fn update_options(
        &self,
        project_id: &ProjectId,
        options: &ProjectOptions,
    ) -> ClientResult<ProjectRecord> {
        let url = self.url(&format!("/projects/{}/options", project_id));
        self.send_json(self.client.patch(url).json(options)).await
    }

    pub async fn start_description(&self, project_id: &ProjectId) -> ClientResult<JobEvent> {
        let url = self.url(&format!("/projects/{}/description", project_id));
        self.send_json(self.client.post(url)).await
    }

    pub async fn generate_commentary(&self, project_id: &ProjectId) -> ClientResult<ProjectRecord> {
        let url = self.url(&format!("/projects/{}/commentary", project_id));
        self.send_json(self.client.post(url)).await
    }

    pub async fn start_video(&self, project_id: &ProjectId) -> ClientResult<JobEvent> {
        let url = self.url(&format!("/projects/{}/video", project_id));
        self.send_json(self.client.post(url)).await
    }

    pub async fn download_artifact(&self, project_id: &ProjectId, name: &str) -> ClientResult<Vec<u8>> {
        let url = self.url(&format!("/projects/{}/artifacts/{}", project_id, name));
        let response = check(self.client.get(url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn status(&self, project_id: &ProjectId, kind: JobKind) -> ClientResult<JobEvent> {
        let url = self.job_url(project_id, kind, "status");
        self.send_json(self.client.get(url)).await
    }

    async fn events(&self, project_id: &ProjectId, kind: JobKind) -> ClientResult<EventStream> {
        let url = self.job_url(project_id, kind, "events");
        let response = check(
            self.client
                .get(url)
                .header(ACCEPT, "text/event-stream")
                .send()
                .await?,
        )
        .await?;
        debug!(project_id = %project_id, kind = %kind, "Event stream opened");

        let body = Box::pin(response.bytes_stream());
        let events = stream::unfold(
            (body, SseDecoder::new(), VecDeque::new()),
            |(mut body, mut decoder, mut pending)| async move {
                loop {
                    if let Some(message) = pending.pop_front() {
                        if let Some(item) = decode_message(message) {
                            return Some((item, (body, decoder, pending)));
                        }
                        continue;
                    }
                    match body.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                        Some(Err(e)) => {
                            return Some((Err(ClientError::from(e)), (body, decoder, pending)))
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(events.boxed())
    }
}

/// Decode a job event, skipping messages of other event types.
fn decode_message(message: SseMessage) -> Option<ClientResult<JobEvent>> {
    match message.event.as_deref() {
        None | Some(STATE_EVENT) => Some(serde_json::from_str(&message.data).map_err(Into::into)),
        Some(_) => None,
    }
}

/// Turn non-success responses into [`ClientError::Api`] with the server's
/// `detail` message.
async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.detail)
        .unwrap_or(text);
    Err(ClientError::api(status.as_u16(), detail))
}
