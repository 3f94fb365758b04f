use futures::StreamExt;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::provider::{CompletionProvider, FragmentStream};
use super::sse::{SseDecoder, SseEvent};
use crate::config::LlmConfig;
use crate::error::{SessionError, SessionResult};
use crate::models::Message;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Client for `POST {base}/v1/chat/completions` on an OpenAI-compatible server.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    first_byte_timeout: Duration,
    stream_timeout: Duration,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> SessionResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| SessionError::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            api_key: config.api_key.clone(),
            first_byte_timeout: config.first_byte_timeout(),
            stream_timeout: config.stream_timeout(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/v1/models", self.base_url)
    }

    /// Send a completion request and wait for the response head, bounded by
    /// the first-byte timeout and the overall deadline.
    async fn send(
        &self,
        request: &ChatCompletionRequest<'_>,
        deadline: Instant,
    ) -> SessionResult<Response> {
        let mut builder = self.client.post(self.completions_url()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        if request.stream {
            builder = builder.header(header::ACCEPT, "text/event-stream");
        }

        let first_byte = (Instant::now() + self.first_byte_timeout).min(deadline);
        let response = timeout_at(first_byte, builder.send())
            .await
            .map_err(|_| {
                SessionError::UpstreamTimeout(format!(
                    "no response from completion endpoint within {:?}",
                    self.first_byte_timeout
                ))
            })??;

        check_status(response).await
    }
}

async fn check_status(response: Response) -> SessionResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_ms = parse_retry_after(&response);
        warn!(?retry_after_ms, "completion endpoint rate limited the request");
        return Err(SessionError::RateLimited { retry_after_ms });
    }

    let body = response.text().await.unwrap_or_default();
    Err(SessionError::Upstream(format!("LLM API error: {} - {}", status, body)))
}

/// `Retry-After` in delta-seconds, converted to milliseconds.
fn parse_retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs * 1000)
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiCompatClient {
    async fn complete(&self, messages: &[Message], model: &str) -> SessionResult<Message> {
        debug!(model, "Starting chat completion with {} messages", messages.len());

        let deadline = Instant::now() + self.stream_timeout;
        let request = ChatCompletionRequest {
            model,
            messages,
            stream: false,
        };
        let response = self.send(&request, deadline).await?;

        let body = timeout_at(deadline, response.text())
            .await
            .map_err(|_| {
                SessionError::UpstreamTimeout(format!("completion exceeded {:?}", self.stream_timeout))
            })??;

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| SessionError::InvalidResponse(format!("Failed to parse LLM response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::InvalidResponse("No choices returned from LLM".to_string()))?
            .message
            .content
            .ok_or_else(|| SessionError::InvalidResponse("Choice carries no content".to_string()))?;

        Ok(Message::assistant(content))
    }

    async fn stream(&self, messages: &[Message], model: &str) -> SessionResult<FragmentStream> {
        debug!(model, "Starting chat stream with {} messages", messages.len());

        let deadline = Instant::now() + self.stream_timeout;
        let request = ChatCompletionRequest {
            model,
            messages,
            stream: true,
        };
        let response = self.send(&request, deadline).await?;
        let stream_timeout = self.stream_timeout;

        let stream = async_stream::try_stream! {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut done = false;

            while !done {
                let next = timeout_at(deadline, body.next())
                    .await
                    .map_err(|_| SessionError::UpstreamTimeout(format!("stream exceeded {:?}", stream_timeout)))?;

                let Some(chunk) = next else { break };
                for event in decoder.push(&chunk?) {
                    match event? {
                        SseEvent::Delta(text) => yield text,
                        SseEvent::Done => {
                            done = true;
                            break;
                        }
                    }
                }
            }

            if !done {
                match decoder.finish()? {
                    Some(SseEvent::Delta(text)) => yield text,
                    Some(SseEvent::Done) => done = true,
                    None => {}
                }
            }
            if !done {
                warn!("Chat stream body ended without [DONE]");
                Err::<(), _>(SessionError::InvalidResponse("stream ended without [DONE]".to_string()))?;
            }
            debug!("Chat stream finished");
        };

        Ok(Box::pin(stream))
    }

    async fn list_models(&self) -> SessionResult<Vec<String>> {
        let mut builder = self.client.get(self.models_url());
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = timeout_at(Instant::now() + self.first_byte_timeout, builder.send())
            .await
            .map_err(|_| SessionError::UpstreamTimeout("model listing timed out".to_string()))??;
        let response = check_status(response).await?;

        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| SessionError::InvalidResponse(format!("Failed to parse model list: {}", e)))?;

        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}
