//! Generation provider trait and request types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{RagError, Result};

/// The author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message of a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// A complete, non-streaming generation request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Messages in conversation order, usually starting with a system instruction.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; the provider default applies when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, ..Self::default() }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// The content of the system message, if any.
    pub fn system_instruction(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
    }

    /// The content of the last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

/// A chat model that turns a [`GenerationRequest`] into response text.
///
/// Failures are reported as [`RagError::GenerationService`](crate::RagError::GenerationService).
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// The model name, used in logs and errors.
    fn name(&self) -> &str;

    /// Generate the full response text for `request`.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

/// Run one generation call under a deadline.
///
/// # Errors
///
/// Returns [`RagError::GenerationService`] on timeout or provider failure.
pub async fn generate_with_timeout(
    provider: &dyn GenerationProvider,
    request: GenerationRequest,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, provider.generate(request)).await {
        Ok(result) => result,
        Err(_) => {
            error!(model = provider.name(), ?timeout, "generation request timed out");
            Err(RagError::GenerationService {
                provider: provider.name().to_string(),
                message: format!("request timed out after {timeout:?}"),
            })
        }
    }
}
