//! OpenAI embedding and chat providers using the OpenAI REST API.
//!
//! This module is only available when the `openai` feature is enabled.
//! Any OpenAI-compatible server works by overriding the base URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{ChatMessage, GenerationProvider, GenerationRequest};

/// The default OpenAI API base URL.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// Connection settings shared by the OpenAI providers.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
}

impl OpenAIConfig {
    /// Create a config with the default endpoint and models.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE.into(),
            chat_model: DEFAULT_CHAT_MODEL.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
        }
    }

    /// Read `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL` from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `OPENAI_API_KEY` is not set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::Config("OPENAI_API_KEY environment variable not set".into())
        })?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }

    /// Point at an OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the chat model (e.g. `gpt-4o-mini`).
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the embedding model (e.g. `text-embedding-3-large`).
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    fn validate(&self, provider: &str) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(RagError::Config(format!("{provider}: API key must not be empty")));
        }
        Ok(())
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Turn a non-success response into a readable message, preferring the API's own.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Uses `reqwest` to call the `/embeddings` endpoint directly.
///
/// # Example
///
/// ```rust,ignore
/// use dose_rag::openai::{OpenAIConfig, OpenAIEmbeddingProvider};
///
/// let provider = OpenAIEmbeddingProvider::new(OpenAIConfig::from_env()?)?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    config: OpenAIConfig,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the API key is empty.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        config.validate("OpenAI embeddings")?;
        Ok(Self {
            client: reqwest::Client::new(),
            config,
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env()?)
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn service_error(message: impl Into<String>) -> RagError {
        RagError::EmbeddingService { provider: "OpenAI".into(), message: message.into() }
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(self.config.endpoint("embeddings"))
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "embedding request failed");
                Self::service_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = "OpenAI", %message, "embedding API error");
            return Err(Self::service_error(message));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse embedding response");
            Self::service_error(format!("failed to parse response: {e}"))
        })?;

        if parsed.data.len() != texts.len() {
            return Err(Self::service_error(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "OpenAI", text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| Self::service_error("API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // The API rejects empty strings, so blank inputs never leave the process.
        let non_blank: Vec<&str> = texts.iter().copied().filter(|t| !t.trim().is_empty()).collect();
        if non_blank.is_empty() {
            return Ok(vec![vec![0.0; self.dimensions]; texts.len()]);
        }

        debug!(
            provider = "OpenAI",
            batch_size = non_blank.len(),
            model = %self.config.embedding_model,
            "embedding batch"
        );

        let mut embedded = self.request(&non_blank).await?.into_iter();
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            if text.trim().is_empty() {
                results.push(vec![0.0; self.dimensions]);
            } else {
                results.push(embedded.next().ok_or_else(|| Self::service_error("missing embedding"))?);
            }
        }
        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A [`GenerationProvider`] backed by the OpenAI chat completions API.
///
/// # Example
///
/// ```rust,ignore
/// use dose_rag::openai::{OpenAIChatModel, OpenAIConfig};
///
/// let model = OpenAIChatModel::new(OpenAIConfig::from_env()?.with_chat_model("gpt-4o-mini"))?;
/// ```
pub struct OpenAIChatModel {
    client: reqwest::Client,
    config: OpenAIConfig,
}

impl OpenAIChatModel {
    /// Create a new chat model client.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the API key is empty.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        config.validate("OpenAI chat")?;
        Ok(Self { client: reqwest::Client::new(), config })
    }

    /// Create a new chat model client from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env()?)
    }

    fn service_error(&self, message: impl Into<String>) -> RagError {
        RagError::GenerationService { provider: self.config.chat_model.clone(), message: message.into() }
    }
}

#[async_trait]
impl GenerationProvider for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.config.chat_model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        debug!(
            model = %self.config.chat_model,
            message_count = request.messages.len(),
            "chat completion request"
        );

        let body = ChatCompletionRequest {
            model: &self.config.chat_model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(model = %self.config.chat_model, error = %e, "chat request failed");
                self.service_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(model = %self.config.chat_model, %message, "chat API error");
            return Err(self.service_error(message));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!(model = %self.config.chat_model, error = %e, "failed to parse chat response");
            self.service_error(format!("failed to parse response: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| self.service_error("API returned no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = OpenAIConfig::new("sk-test").with_base_url("http://localhost:8080/v1/");
        assert_eq!(config.endpoint("embeddings"), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(OpenAIEmbeddingProvider::new(OpenAIConfig::new("")).is_err());
        assert!(OpenAIChatModel::new(OpenAIConfig::new("")).is_err());
    }

    #[test]
    fn chat_request_serializes_lowercase_roles() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = ChatCompletionRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: Some(0.7),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["model"], "gpt-3.5-turbo");
    }

    #[tokio::test]
    async fn blank_batch_skips_the_network() {
        let provider = OpenAIEmbeddingProvider::new(
            OpenAIConfig::new("sk-test").with_base_url("http://127.0.0.1:9"),
        )
        .unwrap()
        .with_dimensions(4);
        let vectors = provider.embed_batch(&["", "  "]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.0; 4], vec![0.0; 4]]);
    }
}
