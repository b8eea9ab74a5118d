//! The model adapter seam used by components that delegate decisions to a
//! language model.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used by model adapters.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Token stream produced by [`ModelAdapter::infer`].
pub type AdapterStream = Pin<Box<dyn Stream<Item = AdapterResult<InferenceChunk>> + Send>>;

/// Failures reported by an adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Credentials or endpoint are missing.
    #[error("model adapter unconfigured: {reason}")]
    Unconfigured {
        /// What is missing.
        reason: String,
    },
    /// The request was refused before reaching the model.
    #[error("inference request rejected: {reason}")]
    Rejected {
        /// Why.
        reason: String,
    },
    /// The provider could not be reached or dropped the connection.
    #[error("model transport failed: {reason}")]
    Transport {
        /// Underlying failure.
        reason: String,
    },
    /// The provider answered with something unusable.
    #[error("malformed model response: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },
}

impl AdapterError {
    /// [`AdapterError::Rejected`]
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// [`AdapterError::Unconfigured`]
    #[must_use]
    pub fn unconfigured(reason: impl Into<String>) -> Self {
        Self::Unconfigured {
            reason: reason.into(),
        }
    }

    /// [`AdapterError::Transport`]
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// [`AdapterError::Malformed`]
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Provider and model behind an adapter, used in logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterMetadata {
    provider: &'static str,
    model: String,
}

impl AdapterMetadata {
    /// Describes `model` served by `provider`.
    #[must_use]
    pub fn new(provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Provider name, e.g. `ollama`.
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Display for AdapterMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Author of a prompt message.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions.
    System,
    /// The request being decided on.
    User,
    /// Earlier model turns.
    Assistant,
}

/// One prompt message.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PromptMessage {
    role: MessageRole,
    content: String,
}

impl PromptMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Author.
    #[must_use]
    pub const fn role(&self) -> MessageRole {
        self.role
    }

    /// Text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Shape the caller expects the answer in. Adapters whose provider supports
/// a JSON mode should enable it for [`ResponseFormat::JsonObject`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free text.
    #[default]
    Text,
    /// A single JSON object.
    JsonObject,
}

/// Request handed to [`ModelAdapter::infer`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct InferenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_prompt: Option<String>,
    messages: Vec<PromptMessage>,
    #[serde(default)]
    response_format: ResponseFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl InferenceRequest {
    /// Creates a free-text request.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Rejected`] when `messages` is empty.
    pub fn new(messages: Vec<PromptMessage>) -> AdapterResult<Self> {
        if messages.is_empty() {
            return Err(AdapterError::rejected("no prompt messages"));
        }
        Ok(Self {
            system_prompt: None,
            messages,
            response_format: ResponseFormat::Text,
            max_output_tokens: None,
            temperature: None,
        })
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Asks for an answer of the given shape.
    #[must_use]
    pub const fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    /// Caps the answer length.
    #[must_use]
    pub const fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Sets the sampling temperature; `0.0` for deterministic decisions.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// System prompt, if any.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Prompt messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }

    /// Expected answer shape.
    #[must_use]
    pub const fn response_format(&self) -> ResponseFormat {
        self.response_format
    }

    /// Answer length cap.
    #[must_use]
    pub const fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }

    /// Sampling temperature.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }
}

/// A slice of the answer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct InferenceChunk {
    /// Text appended by this chunk.
    pub delta: String,
    /// Set on the final chunk.
    pub done: bool,
}

impl InferenceChunk {
    /// Creates a chunk.
    #[must_use]
    pub fn new(delta: impl Into<String>, done: bool) -> Self {
        Self {
            delta: delta.into(),
            done,
        }
    }
}

/// A language model the runtime can consult.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Who serves the model.
    fn metadata(&self) -> &AdapterMetadata;

    /// Streams the answer to `request`.
    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream>;
}

/// Concatenates chunk deltas up to and including the first `done` chunk.
///
/// # Errors
///
/// Returns the first error the stream yields.
pub async fn collect_text(mut stream: AdapterStream) -> AdapterResult<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        text.push_str(&chunk.delta);
        if chunk.done {
            break;
        }
    }
    Ok(text)
}
