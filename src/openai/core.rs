use std::{fmt, time::Duration};

use anyhow::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ConnectionConfig;

/// Every request asks for the same completion budget.
pub const MAX_TOKENS: u32 = 150;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

/// One turn in the conversation. `System` turns are synthesized
/// locally when a completion fails and are sent back to the API like
/// any other turn.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub max_tokens: u32,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(model: &'a str, messages: &'a [Message]) -> Self {
        Self {
            model,
            messages,
            max_tokens: MAX_TOKENS,
        }
    }
}

// Only `choices[*].message.content` is read, the rest of the
// response (id, usage, finish_reason, etc.) is ignored.
#[derive(Deserialize, Debug, Default)]
pub struct CompletionResponse {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionResponse {
    /// Assistant messages in the order the choices were returned.
    pub fn into_messages(self) -> Vec<Message> {
        self.choices
            .unwrap_or_default()
            .into_iter()
            .map(|choice| {
                let content = choice
                    .message
                    .and_then(|m| m.content)
                    .unwrap_or_default();
                Message::new(Role::Assistant, &content)
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompletionError {
    /// The API answered with a non-2xx status.
    Http { status: u16, body: String },
    /// Anything that kept us from getting a usable response: DNS,
    /// connect, TLS, timeouts, or a body that isn't valid JSON.
    Transport { message: String },
}

impl CompletionError {
    fn transport(err: &(dyn std::error::Error + 'static)) -> Self {
        // reqwest puts the interesting part (e.g. "operation timed
        // out") in the source chain
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        CompletionError::Transport { message }
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::Http { status, body } => write!(f, "Error {}: {}", status, body),
            CompletionError::Transport { message } => write!(f, "Exception {}", message),
        }
    }
}

impl std::error::Error for CompletionError {}

#[derive(Clone, Debug, PartialEq)]
pub enum CompletionResult {
    Messages(Vec<Message>),
    Failed(CompletionError),
}

impl CompletionResult {
    /// The turns to append to the transcript: every assistant message
    /// on success, otherwise a single system message describing the
    /// failure.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            CompletionResult::Messages(messages) => messages,
            CompletionResult::Failed(err) => vec![Message::new(Role::System, &err.to_string())],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CompletionResult::Failed(_))
    }
}

impl From<Result<Vec<Message>, CompletionError>> for CompletionResult {
    fn from(result: Result<Vec<Message>, CompletionError>) -> Self {
        match result {
            Ok(messages) => CompletionResult::Messages(messages),
            Err(err) => CompletionResult::Failed(err),
        }
    }
}

/// Runs exactly one request/response cycle for a transcript.
/// Implementations never fail outright, errors are folded into the
/// `CompletionResult`.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[Message], config: &ConnectionConfig) -> CompletionResult;
}

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: timeout,
            read_timeout: timeout,
            write_timeout: timeout,
        }
    }

    // reqwest has no write timeout so sending the request and waiting
    // for the response headers is capped at the sum of all three
    // phases. Reading the body is only bound by `read_timeout`.
    fn send_timeout(&self) -> Duration {
        self.connect_timeout + self.read_timeout + self.write_timeout
    }
}

/// Client for an OpenAI compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    options: ClientOptions,
}

impl OpenAiClient {
    pub fn new(options: ClientOptions) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .read_timeout(options.read_timeout)
            .build()?;
        Ok(Self { http, options })
    }

    async fn request(
        &self,
        messages: &[Message],
        config: &ConnectionConfig,
    ) -> Result<Vec<Message>, CompletionError> {
        let payload = CompletionRequest::new(&config.model, messages);
        let url = format!(
            "{}/v1/chat/completions",
            config.base_url.trim_end_matches("/")
        );
        tracing::debug!(
            "Requesting completion from {} with {} messages",
            url,
            messages.len()
        );

        let send = self
            .http
            .post(&url)
            .bearer_auth(&config.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send();
        let response = tokio::time::timeout(self.options.send_timeout(), send)
            .await
            .map_err(|e| CompletionError::transport(&e))?
            .map_err(|e| CompletionError::transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::transport(&e))?;

        if !status.is_success() {
            tracing::warn!("Completion failed with status {}: {}", status, body);
            return Err(CompletionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let resp: CompletionResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("Parsing completion failed for {}\nError: {}", body, e);
            CompletionError::transport(&e)
        })?;

        Ok(resp.into_messages())
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[Message], config: &ConnectionConfig) -> CompletionResult {
        let result = self.request(messages, config).await;
        if let Err(CompletionError::Transport { message }) = &result {
            tracing::warn!("Completion request failed: {}", message);
        }
        result.into()
    }
}
