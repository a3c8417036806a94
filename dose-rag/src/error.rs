//! Error types for the `dose-rag` crate.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A stage of the retrieval-augmented chain.
///
/// Carried by [`RagError::AnsweringFailure`] so that a transport can log
/// where in the pipeline a request died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStage {
    RewriteQuery,
    Retrieve,
    AssemblePrompt,
    Generate,
}

impl fmt::Display for ChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RewriteQuery => "rewrite_query",
            Self::Retrieve => "retrieve",
            Self::AssemblePrompt => "assemble_prompt",
            Self::Generate => "generate",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while loading documents or answering a question.
#[derive(Debug, Error)]
pub enum RagError {
    /// The referenced file does not exist or cannot be opened.
    #[error("File not found: {file_id}")]
    FileNotFound {
        /// The identifier the caller asked for.
        file_id: String,
    },

    /// The file extension does not map to a supported loader.
    #[error("Unsupported file type '{extension}' for {file_id}")]
    UnsupportedFormat {
        /// The identifier the caller asked for.
        file_id: String,
        /// The detected extension (lowercase, without the dot; empty if none).
        extension: String,
    },

    /// The file was read but its contents could not be decoded.
    #[error("Failed to parse {file_id}: {source}")]
    ParseFailure {
        /// The identifier of the file being parsed.
        file_id: String,
        /// The underlying parser error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The embedding service failed (network, quota, auth or timeout).
    #[error("Embedding service error ({provider}): {message}")]
    EmbeddingService {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation service failed (network, quota, auth or timeout).
    #[error("Generation service error ({provider}): {message}")]
    GenerationService {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A fatal failure inside the answering chain.
    #[error("Answering failed during {stage}: {source}")]
    AnsweringFailure {
        /// The chain stage that failed.
        stage: ChainStage,
        /// The cause of the failure.
        #[source]
        source: Box<RagError>,
    },

    /// Vectors of different dimensions were mixed in one index.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension the index was built with.
        expected: usize,
        /// The offending dimension.
        actual: usize,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// The kind of a [`RagError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FileNotFound,
    UnsupportedFormat,
    ParseFailure,
    EmbeddingService,
    GenerationService,
    AnsweringFailure,
    DimensionMismatch,
    Config,
}

impl RagError {
    /// Wrap `source` as a fatal failure of the given chain stage.
    pub fn answering(stage: ChainStage, source: RagError) -> Self {
        Self::AnsweringFailure { stage, source: Box::new(source) }
    }

    /// Build a [`RagError::ParseFailure`] from any parser error.
    pub fn parse(
        file_id: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ParseFailure { file_id: file_id.into(), source: source.into() }
    }

    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::ParseFailure { .. } => ErrorKind::ParseFailure,
            Self::EmbeddingService { .. } => ErrorKind::EmbeddingService,
            Self::GenerationService { .. } => ErrorKind::GenerationService,
            Self::AnsweringFailure { .. } => ErrorKind::AnsweringFailure,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Return the file identifier a loader error originated from.
    pub fn file_id(&self) -> Option<&str> {
        match self {
            Self::FileNotFound { file_id }
            | Self::UnsupportedFormat { file_id, .. }
            | Self::ParseFailure { file_id, .. } => Some(file_id),
            Self::AnsweringFailure { source, .. } => source.file_id(),
            _ => None,
        }
    }

    /// Return the chain stage for answering failures.
    pub fn stage(&self) -> Option<ChainStage> {
        match self {
            Self::AnsweringFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// A convenience result type for document answering operations.
pub type Result<T> = std::result::Result<T, RagError>;
