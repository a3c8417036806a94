//! # dose-rag
//!
//! Retrieval-augmented question answering over uploaded documents.
//!
//! ## Overview
//!
//! A request names a question, zero or more uploaded files and, optionally,
//! the prior conversation. The crate turns that into an answer grounded in
//! the files plus the segments the answer was drawn from:
//!
//! - [`DocumentLoader`] reads a file from a [`FileStore`] and splits it into
//!   [`Segment`]s (PDF per page; DOCX and plain text via a [`Chunker`])
//! - [`SegmentIndex`] embeds segments with an [`EmbeddingProvider`] and
//!   answers cosine-similarity top-k queries
//! - [`RetrievalChain`] rewrites follow-ups, retrieves, assembles a grounded
//!   prompt and calls a [`GenerationProvider`]
//! - [`DocumentAssistant`] wires it all together per request
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dose_rag::{DocumentAssistant, LocalFileStore, RagConfig};
//! use dose_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
//!
//! let assistant = DocumentAssistant::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!     .generation_provider(Arc::new(OpenAIChatModel::from_env()?))
//!     .file_store(Arc::new(LocalFileStore::new("uploads")))
//!     .build()?;
//!
//! let files = vec!["report.pdf".to_string()];
//! let result = assistant.answer("What was Q3 revenue?", &files, &[]).await?;
//! println!("{}", result.answer);
//! ```
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` (default) | OpenAI embedding and chat providers |
//!
//! [`HashingEmbeddingProvider`] needs no network access and is always available.

pub mod cache;
pub mod chain;
pub mod chunking;
pub mod config;
pub mod conversation;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod hashing;
pub mod index;
pub mod loader;
#[cfg(feature = "openai")]
pub mod openai;
pub mod session;
pub mod storage;

pub use cache::IndexCache;
pub use chain::{RetrievalChain, StandaloneQuestion};
pub use chunking::{Chunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use conversation::{Conversation, ConversationTurn, Role};
pub use document::{ChainResult, ScoredSegment, Segment, SegmentMetadata};
pub use embedding::EmbeddingProvider;
pub use error::{ChainStage, ErrorKind, RagError, Result};
pub use generation::{ChatMessage, GenerationProvider, GenerationRequest, MessageRole};
pub use hashing::HashingEmbeddingProvider;
pub use index::{BuildOptions, DEFAULT_TOP_K, SegmentIndex};
pub use loader::{DocumentFormat, DocumentLoader, SourceFile};
pub use session::{ChatRequest, ChatResponse, DocumentAssistant, DocumentAssistantBuilder};
pub use storage::{FileStore, LocalFileStore};
