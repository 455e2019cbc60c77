//! Boundary to the hosted language model used for extraction, review and drafting.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ReasoningConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A single-turn prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningRequest {
    pub prompt: String,
    pub max_tokens: u32,
}

impl ReasoningRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReasoningError {
    #[error("reasoning service timed out")]
    Timeout,
    #[error("reasoning service is not configured")]
    Disabled,
    #[error("reasoning transport failed: {0}")]
    Transport(String),
    #[error("reasoning service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reasoning service returned no text")]
    EmptyResponse,
}

/// Text-completion backend. Implementations must be shareable across requests.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, request: ReasoningRequest) -> Result<String, ReasoningError>;
}

/// Stand-in used when no API key is configured; every call fails so callers fall back.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledReasoning;

#[async_trait]
impl ReasoningService for DisabledReasoning {
    async fn complete(&self, _request: ReasoningRequest) -> Result<String, ReasoningError> {
        Err(ReasoningError::Disabled)
    }
}

/// Messages API client.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    /// Returns `None` when the configuration carries no API key.
    pub fn from_config(config: &ReasoningConfig) -> Result<Option<Self>, ReasoningError> {
        match config.api_key.as_deref() {
            Some(api_key) => Self::new(api_key, &config.model, &config.base_url, config.timeout)
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ReasoningError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ReasoningError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body<'a>(&'a self, request: &'a ReasoningRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        }
    }
}

#[async_trait]
impl ReasoningService for AnthropicClient {
    async fn complete(&self, request: ReasoningRequest) -> Result<String, ReasoningError> {
        debug!(
            model = %self.model,
            max_tokens = request.max_tokens,
            prompt_chars = request.prompt.len(),
            "sending reasoning request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(&request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "reasoning service rejected request");
            return Err(ReasoningError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response.json().await.map_err(transport_error)?;
        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ReasoningError::EmptyResponse)
    }
}

/// Runs one completion under a deadline regardless of the backend's own timeout.
pub async fn complete_within(
    service: &dyn ReasoningService,
    request: ReasoningRequest,
    deadline: Duration,
) -> Result<String, ReasoningError> {
    match tokio::time::timeout(deadline, service.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(ReasoningError::Timeout),
    }
}

fn transport_error(err: reqwest::Error) -> ReasoningError {
    if err.is_timeout() {
        ReasoningError::Timeout
    } else {
        ReasoningError::Transport(err.to_string())
    }
}

/// The outermost `{ ... }` span of a model reply, ignoring fences and chatter around it.
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let trimmed = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Deserializes the JSON object embedded in a model reply.
pub fn parse_embedded_json<T: DeserializeOwned>(reply: &str) -> Option<T> {
    let object = extract_json_object(reply)?;
    match serde_json::from_str(object) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(error = %err, "model reply did not match expected shape");
            None
        }
    }
}
