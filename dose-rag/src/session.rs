//! Per-request orchestration: files + question → answer.
//!
//! The [`DocumentAssistant`] is the entry point a transport calls for every
//! chat request. With no files it answers directly under a fixed
//! "no documents yet" instruction. Otherwise it loads every referenced file,
//! pools all segments into one [`SegmentIndex`] and runs the
//! [`RetrievalChain`].
//!
//! Loading is all-or-nothing across files: if any file fails, the request
//! fails and no index is built.
//!
//! # Example
//!
//! ```rust,ignore
//! use dose_rag::{DocumentAssistant, LocalFileStore, RagConfig};
//!
//! let assistant = DocumentAssistant::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .generation_provider(Arc::new(chat_model))
//!     .file_store(Arc::new(LocalFileStore::new("uploads")))
//!     .build()?;
//!
//! let result = assistant.answer("What is the capital of France?", &files, &[]).await?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::cache::IndexCache;
use crate::chain::RetrievalChain;
use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::conversation::{ConversationTurn, Role};
use crate::document::{ChainResult, Segment, SegmentMetadata};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{ChatMessage, GenerationProvider, GenerationRequest, generate_with_timeout};
use crate::index::{BuildOptions, SegmentIndex};
use crate::loader::{DocumentLoader, SourceFile};
use crate::storage::FileStore;

/// System instruction used when no documents are referenced.
pub const NO_DOCUMENTS_INSTRUCTION: &str =
    "You are DoSe, a helpful document search assistant. Currently, no documents have been uploaded.";

/// An inbound chat request as sent by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(alias = "message")]
    pub question: String,
    #[serde(default, alias = "context")]
    pub file_identifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ConversationTurn>,
}

/// The response a transport serializes back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<SegmentMetadata>,
}

impl From<ChainResult> for ChatResponse {
    fn from(result: ChainResult) -> Self {
        Self {
            response: result.answer,
            sources: result.source_segments.into_iter().map(|s| s.metadata).collect(),
        }
    }
}

/// Answers questions about uploaded files.
///
/// Holds injected providers and storage; every request builds its own
/// index unless the index cache is enabled through
/// [`RagConfig::cache_capacity`].
pub struct DocumentAssistant {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generation_provider: Arc<dyn GenerationProvider>,
    loader: DocumentLoader,
    chain: RetrievalChain,
    cache: Option<IndexCache>,
}

impl DocumentAssistant {
    /// Create a new [`DocumentAssistantBuilder`].
    pub fn builder() -> DocumentAssistantBuilder {
        DocumentAssistantBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Answer `question` using the files named in `file_ids`.
    ///
    /// Duplicate identifiers are loaded once. With no identifiers the answer
    /// is generated without documents and `source_segments` is empty.
    ///
    /// # Errors
    ///
    /// - loader errors ([`RagError::FileNotFound`], [`RagError::UnsupportedFormat`],
    ///   [`RagError::ParseFailure`]) for the first file that fails
    /// - [`RagError::EmbeddingService`] if indexing fails
    /// - [`RagError::AnsweringFailure`] if the chain fails
    /// - [`RagError::GenerationService`] if the document-free answer fails
    pub async fn answer(
        &self,
        question: &str,
        file_ids: &[String],
        history: &[ConversationTurn],
    ) -> Result<ChainResult> {
        if file_ids.is_empty() {
            info!("no documents referenced, answering without retrieval");
            return self.answer_without_documents(question, history).await;
        }

        let mut seen = HashSet::new();
        let file_ids: Vec<&str> =
            file_ids.iter().map(String::as_str).filter(|id| seen.insert(*id)).collect();
        info!(file_count = file_ids.len(), "answering from documents");

        let mut sources = Vec::with_capacity(file_ids.len());
        for file_id in &file_ids {
            sources.push(self.loader.read(file_id).await?);
        }

        let index = self.index_for(&sources).await?;
        self.chain.invoke(&index, question, history).await
    }

    /// Handle a wire-format request.
    ///
    /// # Errors
    ///
    /// See [`answer`](Self::answer).
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse> {
        let result = self
            .answer(&request.question, &request.file_identifiers, &request.history)
            .await
            .inspect_err(|e| {
                error!(
                    kind = ?e.kind(),
                    file_id = e.file_id().unwrap_or_default(),
                    stage = ?e.stage(),
                    error = %e,
                    "chat request failed"
                );
            })?;
        Ok(result.into())
    }

    /// Load all sources, then build (or reuse) one index over their pooled segments.
    async fn index_for(&self, sources: &[SourceFile]) -> Result<Arc<SegmentIndex>> {
        let key = self.cache.as_ref().map(|_| IndexCache::key(sources));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(index) = cache.get(key).await {
                info!(segment_count = index.len(), "reusing cached index");
                return Ok(index);
            }
        }

        let mut segments: Vec<Segment> = Vec::new();
        for source in sources {
            segments.extend(self.loader.parse(source)?);
        }
        info!(segment_count = segments.len(), "pooled segments from all files");

        let options = BuildOptions::from(&self.config);
        let index =
            Arc::new(SegmentIndex::build(segments, self.embedding_provider.as_ref(), &options).await?);

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, Arc::clone(&index)).await;
        }
        Ok(index)
    }

    async fn answer_without_documents(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<ChainResult> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(NO_DOCUMENTS_INSTRUCTION));
        messages.extend(history.iter().map(|turn| match turn.role {
            Role::User => ChatMessage::user(turn.text.as_str()),
            Role::Assistant => ChatMessage::assistant(turn.text.as_str()),
        }));
        messages.push(ChatMessage::user(question));

        let request = GenerationRequest::new(messages).with_temperature(self.config.temperature);
        let answer = generate_with_timeout(
            self.generation_provider.as_ref(),
            request,
            self.config.request_timeout(),
        )
        .await?;
        Ok(ChainResult::ungrounded(answer))
    }
}

/// Builder for constructing a [`DocumentAssistant`].
///
/// All fields except `chunker` are required. Call [`build()`](DocumentAssistantBuilder::build)
/// to validate and produce the assistant.
#[derive(Default)]
pub struct DocumentAssistantBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    file_store: Option<Arc<dyn FileStore>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl DocumentAssistantBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Set the storage uploaded files are read from.
    pub fn file_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.file_store = Some(store);
        self
    }

    /// Override the chunker used for text and DOCX files.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`DocumentAssistant`], validating the config and required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or the
    /// config is invalid.
    pub fn build(self) -> Result<DocumentAssistant> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::Config("generation_provider is required".to_string()))?;
        let file_store = self
            .file_store
            .ok_or_else(|| RagError::Config("file_store is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        });

        let chain = RetrievalChain::new(
            Arc::clone(&embedding_provider),
            Arc::clone(&generation_provider),
            &config,
        );
        let cache = (config.cache_capacity > 0).then(|| IndexCache::new(config.cache_capacity));

        Ok(DocumentAssistant {
            loader: DocumentLoader::new(file_store, chunker),
            chain,
            cache,
            config,
            embedding_provider,
            generation_provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_request_fields_are_accepted() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"message": "hi", "context": ["a.txt"]}"#).unwrap();
        assert_eq!(request.question, "hi");
        assert_eq!(request.file_identifiers, vec!["a.txt".to_string()]);
        assert!(request.history.is_empty());

        let request: ChatRequest =
            serde_json::from_str(r#"{"question": "hi", "fileIdentifiers": []}"#).unwrap();
        assert!(request.file_identifiers.is_empty());
    }

    #[test]
    fn response_carries_segment_metadata_only() {
        let result = ChainResult {
            answer: "Paris".into(),
            source_segments: vec![Segment::new(
                "The capital of France is Paris.",
                SegmentMetadata::new("france.txt", 0).with_extra("format", "text"),
            )],
        };
        let json = serde_json::to_value(ChatResponse::from(result)).unwrap();
        assert_eq!(json["response"], "Paris");
        assert_eq!(json["sources"][0]["sourceId"], "france.txt");
        assert_eq!(json["sources"][0]["position"], 0);
        assert_eq!(json["sources"][0]["extra"]["format"], "text");
        assert!(json["sources"][0].get("text").is_none());
    }

    #[test]
    fn builder_requires_providers() {
        let err = DocumentAssistant::builder().config(RagConfig::default()).build().err().unwrap();
        assert!(matches!(err, RagError::Config(msg) if msg.contains("embedding_provider")));
    }
}
