//! In-memory segment index using cosine similarity.
//!
//! [`SegmentIndex`] is built once from a set of [`Segment`]s and then only
//! read. It supports a single operation: the `k` segments nearest to a query
//! vector. There is no update or delete; a changed file set means a new index.

use std::cmp::Ordering;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::config::RagConfig;
use crate::document::{ScoredSegment, Segment};
use crate::embedding::{EmbeddingProvider, embed_batch_with_timeout};
use crate::error::{RagError, Result};

/// Number of segments retrieved when the caller does not say otherwise.
pub const DEFAULT_TOP_K: usize = 4;

/// How [`SegmentIndex::build`] talks to the embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Texts per embedding request.
    pub batch_size: usize,
    /// Embedding requests in flight at once.
    pub concurrency: usize,
    /// Deadline for each embedding request.
    pub timeout: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for BuildOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            batch_size: config.embedding_batch_size.max(1),
            concurrency: config.embedding_concurrency.max(1),
            timeout: config.request_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    segment: Segment,
    embedding: Vec<f32>,
}

/// An immutable collection of (segment, vector) pairs searchable by cosine similarity.
///
/// Every vector in one index has the same dimension.
///
/// # Example
///
/// ```rust,ignore
/// use dose_rag::{BuildOptions, SegmentIndex};
///
/// let index = SegmentIndex::build(segments, &embedder, &BuildOptions::default()).await?;
/// let hits = index.query(&query_vector, 4)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct SegmentIndex {
    entries: Vec<IndexEntry>,
    dimensions: Option<usize>,
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Descending score, then ascending `(source_id, position)`.
fn rank(a: &ScoredSegment, b: &ScoredSegment) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.segment.source_id().cmp(b.segment.source_id()))
        .then_with(|| a.segment.position().cmp(&b.segment.position()))
}

impl SegmentIndex {
    /// An index with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from segments and precomputed vectors.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the vectors do not all have
    /// the same, non-zero dimension.
    pub fn from_embeddings(entries: Vec<(Segment, Vec<f32>)>) -> Result<Self> {
        let Some(expected) = entries.first().map(|(_, v)| v.len()) else {
            return Ok(Self::empty());
        };
        if expected == 0 {
            return Err(RagError::DimensionMismatch { expected: 1, actual: 0 });
        }
        if let Some((_, bad)) = entries.iter().find(|(_, v)| v.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: bad.len() });
        }

        let entries = entries
            .into_iter()
            .map(|(segment, embedding)| IndexEntry { segment, embedding })
            .collect();
        Ok(Self { entries, dimensions: Some(expected) })
    }

    /// Embed every segment with `embedder` and index the results.
    ///
    /// Segments are embedded in batches of `options.batch_size`, with up to
    /// `options.concurrency` requests in flight; vectors are paired with
    /// segments in input order regardless of completion order. Zero segments
    /// yield an empty index without contacting the provider.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingService`] if any batch fails or times out
    /// - [`RagError::DimensionMismatch`] if the provider returns vectors whose
    ///   dimension differs from [`EmbeddingProvider::dimensions`]
    pub async fn build(
        segments: Vec<Segment>,
        embedder: &dyn EmbeddingProvider,
        options: &BuildOptions,
    ) -> Result<Self> {
        if segments.is_empty() {
            info!(segment_count = 0, "built empty segment index");
            return Ok(Self::empty());
        }

        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        let batches: Vec<&[&str]> = texts.chunks(options.batch_size.max(1)).collect();
        debug!(
            provider = embedder.name(),
            segment_count = segments.len(),
            batch_count = batches.len(),
            "embedding segments"
        );

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| embed_batch_with_timeout(embedder, batch, options.timeout))
            .buffered(options.concurrency.max(1))
            .try_collect()
            .await?;
        let embeddings: Vec<Vec<f32>> = embedded.into_iter().flatten().collect();

        let expected = embedder.dimensions();
        if let Some(bad) = embeddings.iter().find(|v| v.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: bad.len() });
        }

        let index = Self::from_embeddings(segments.into_iter().zip(embeddings).collect())?;
        info!(segment_count = index.len(), dimensions = expected, "built segment index");
        Ok(index)
    }

    /// Number of indexed segments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no segments.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension, or `None` for an empty index.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Return the `k` segments most similar to `query`.
    ///
    /// Results are ordered by descending cosine similarity, ties broken by
    /// ascending `(source_id, position)`. If `k` exceeds the number of
    /// segments, every segment is returned. An empty index always returns
    /// an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if a non-empty index is
    /// queried with a vector of another dimension.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<ScoredSegment>> {
        let Some(expected) = self.dimensions else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(RagError::DimensionMismatch { expected, actual: query.len() });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredSegment> = self
            .entries
            .iter()
            .map(|entry| ScoredSegment {
                segment: entry.segment.clone(),
                score: cosine_similarity(&entry.embedding, query),
            })
            .collect();

        scored.sort_by(rank);
        scored.truncate(k);
        Ok(scored)
    }
}
