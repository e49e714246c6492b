//! Tiered client for local language-model servers.
//!
//! Local servers expose different API shapes, so a query walks a fixed
//! ladder instead of requiring the user to configure one:
//!
//! ```text
//! chat endpoint          (Ollama /api/chat)            ─┐ 404 or timeout
//! OpenAI chat endpoint   (/v1/chat/completions)        ─┤ → next rung
//! generate endpoint      (flattened single prompt)     ─┘ any failure → ""
//! ```
//!
//! A timeout sleeps for the backoff and then moves on to the *next* rung; the
//! same endpoint is never retried within one query. Any other HTTP or
//! transport error on a chat rung aborts the whole query.

mod transport;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::prompt::{self, Conversation};

pub use transport::{HttpTransport, TransportError, UreqTransport};

/// Endpoint and timing settings for [`LlmClient`].
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub chat_url: String,
    pub openai_url: String,
    pub generate_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Pause after a timed-out chat request before trying the next endpoint.
    pub timeout_backoff: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gemma3:4b".to_string(),
            chat_url: "http://localhost:11434/api/chat".to_string(),
            openai_url: "http://localhost:11434/v1/chat/completions".to_string(),
            generate_url: "http://localhost:11434/api/generate".to_string(),
            timeout: Duration::from_secs(300),
            timeout_backoff: Duration::from_secs(10),
        }
    }
}

/// Errors that abort a query before the generate fallback is reached.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to {url} failed: {source}")]
    Endpoint {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("unexpected response from {url}: {detail}")]
    UnexpectedResponse { url: String, detail: String },
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Anything that can turn a conversation into generated text.
///
/// An empty answer means every backend failed and the caller should skip
/// the cycle.
pub trait LanguageModel {
    fn query(&self, conversation: &Conversation) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a Conversation,
    stream: bool,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// The two chat response shapes, tried in order.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatReply {
    /// OpenAI chat-completion shape: `choices[0].message.content`.
    Completion { choices: Vec<Choice> },
    /// Ollama shape: `message.content`.
    Message { message: ReplyMessage },
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    completion: Option<String>,
    /// Ollama's native generate field.
    #[serde(default)]
    response: Option<String>,
}

impl ChatReply {
    fn into_text(self) -> Option<String> {
        match self {
            ChatReply::Completion { choices } => choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content.unwrap_or_default()),
            ChatReply::Message { message } => Some(message.content.unwrap_or_default()),
        }
    }
}

/// What happened on one chat rung.
enum Rung {
    Answered(String),
    Skip,
}

pub struct LlmClient<T: HttpTransport = UreqTransport> {
    settings: LlmSettings,
    transport: T,
}

impl LlmClient<UreqTransport> {
    /// Client talking HTTP with the configured per-request timeout.
    pub fn new(settings: LlmSettings) -> Self {
        let transport = UreqTransport::new(settings.timeout);
        Self::with_transport(settings, transport)
    }
}

impl<T: HttpTransport> LlmClient<T> {
    pub fn with_transport(settings: LlmSettings, transport: T) -> Self {
        Self {
            settings,
            transport,
        }
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn try_chat(&self, url: &str, payload: &Value) -> Result<Rung, LlmError> {
        debug!(url, "sending chat request");
        match self.transport.post_json(url, payload) {
            Ok(body) => {
                let reply: ChatReply = serde_json::from_value(body).map_err(|e| {
                    LlmError::UnexpectedResponse {
                        url: url.to_string(),
                        detail: e.to_string(),
                    }
                })?;
                let text = reply
                    .into_text()
                    .ok_or_else(|| LlmError::UnexpectedResponse {
                        url: url.to_string(),
                        detail: "empty choices array".to_string(),
                    })?;
                Ok(Rung::Answered(text.trim().to_string()))
            }
            Err(TransportError::Timeout) => {
                warn!(
                    url,
                    backoff_ms = self.settings.timeout_backoff.as_millis() as u64,
                    "chat request timed out; moving to next endpoint"
                );
                std::thread::sleep(self.settings.timeout_backoff);
                Ok(Rung::Skip)
            }
            Err(TransportError::Status(404)) => {
                debug!(url, "endpoint not supported (404)");
                Ok(Rung::Skip)
            }
            Err(source) => Err(LlmError::Endpoint {
                url: url.to_string(),
                source,
            }),
        }
    }

    fn try_generate(&self, conversation: &Conversation) -> Result<String, LlmError> {
        let prompt = prompt::flatten(conversation);
        let payload = serde_json::to_value(GenerateRequest {
            model: &self.settings.model,
            prompt: &prompt,
            stream: false,
        })?;
        let url = self.settings.generate_url.as_str();
        debug!(url, "falling back to generate endpoint");

        let body = self
            .transport
            .post_json(url, &payload)
            .map_err(|source| LlmError::Endpoint {
                url: url.to_string(),
                source,
            })?;
        let reply: GenerateReply =
            serde_json::from_value(body).map_err(|e| LlmError::UnexpectedResponse {
                url: url.to_string(),
                detail: e.to_string(),
            })?;
        let text = reply.completion.or(reply.response).unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

impl<T: HttpTransport> LanguageModel for LlmClient<T> {
    fn query(&self, conversation: &Conversation) -> Result<String, LlmError> {
        let payload = serde_json::to_value(ChatRequest {
            model: &self.settings.model,
            messages: conversation,
            stream: false,
        })?;

        for url in [&self.settings.chat_url, &self.settings.openai_url] {
            if let Rung::Answered(text) = self.try_chat(url, &payload)? {
                info!(url = %url, answer_len = text.len(), "model answered");
                return Ok(text);
            }
        }

        match self.try_generate(conversation) {
            Ok(text) => {
                info!(answer_len = text.len(), "model answered via generate endpoint");
                Ok(text)
            }
            Err(error) => {
                warn!(error = %error, "all endpoints failed");
                Ok(String::new())
            }
        }
    }
}
