//! Offline embeddings using feature hashing.
//!
//! Uses the hashing trick to produce fixed-size vectors without a model or
//! a vocabulary. The same text always produces the same vector, which makes
//! this provider suitable for tests and for running without network access.
//! Retrieval quality is lexical, not semantic.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Default dimensionality of hashed embeddings.
pub const DEFAULT_HASHING_DIMENSIONS: usize = 256;

/// An [`EmbeddingProvider`] that hashes lowercase word tokens into buckets.
///
/// The term-frequency vector is L2-normalised, so cosine similarity
/// reduces to a dot product.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self { dimensions: DEFAULT_HASHING_DIMENSIONS }
    }
}

impl HashingEmbeddingProvider {
    /// Create a provider with [`DEFAULT_HASHING_DIMENSIONS`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider producing `dimensions`-sized vectors.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `dimensions` is zero.
    pub fn with_dimensions(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::Config("embedding dimensions must be greater than zero".into()));
        }
        Ok(Self { dimensions })
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a, stable across platforms and compiler versions.
        let hash = token
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| (acc ^ u64::from(b)).wrapping_mul(0x100_0000_01b3));
        (hash % self.dimensions as u64) as usize
    }

    fn hash_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            vector[self.bucket(&token)] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    fn name(&self) -> &str {
        "Hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
