//! Data types for segments, search results and chain results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Provenance of a [`Segment`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetadata {
    /// Identifier of the file the segment was extracted from.
    pub source_id: String,
    /// 0-based order of the segment within its file (page index or chunk index).
    pub position: usize,
    /// Format-specific extras such as `format` or `page`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SegmentMetadata {
    /// Create metadata with no extras.
    pub fn new(source_id: impl Into<String>, position: usize) -> Self {
        Self { source_id: source_id.into(), position, extra: BTreeMap::new() }
    }

    /// Attach an extra key-value pair.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A unit of extracted document text, the atomic item retrieved and cited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    /// The extracted text.
    pub text: String,
    /// Where the text came from.
    pub metadata: SegmentMetadata,
}

impl Segment {
    /// Create a new segment.
    pub fn new(text: impl Into<String>, metadata: SegmentMetadata) -> Self {
        Self { text: text.into(), metadata }
    }

    /// The identifier of the originating file.
    pub fn source_id(&self) -> &str {
        &self.metadata.source_id
    }

    /// The 0-based position within the originating file.
    pub fn position(&self) -> usize {
        self.metadata.position
    }
}

/// A retrieved [`Segment`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredSegment {
    /// The retrieved segment.
    pub segment: Segment,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// The outcome of answering one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainResult {
    /// The generated answer text.
    pub answer: String,
    /// The segments passed into generation, in retrieval order.
    pub source_segments: Vec<Segment>,
}

impl ChainResult {
    /// A result with no grounding segments.
    pub fn ungrounded(answer: impl Into<String>) -> Self {
        Self { answer: answer.into(), source_segments: Vec::new() }
    }
}
