//! Embedding provider trait for generating vector embeddings from text.

use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. Every vector a provider returns has [`dimensions`](EmbeddingProvider::dimensions)
/// entries. Blank input (empty or whitespace-only) yields a zero vector
/// without contacting the backend; a zero vector has cosine similarity 0
/// with everything.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use dose_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// A short name used in logs and errors.
    fn name(&self) -> &str;

    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The output has one vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Embed a batch under a deadline, checking the one-to-one contract.
///
/// # Errors
///
/// Returns [`RagError::EmbeddingService`] on timeout, on provider failure,
/// or when the provider returns a different number of vectors than inputs.
pub async fn embed_batch_with_timeout(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    let vectors = match tokio::time::timeout(timeout, provider.embed_batch(texts)).await {
        Ok(result) => result?,
        Err(_) => {
            error!(provider = provider.name(), ?timeout, "embedding request timed out");
            return Err(RagError::EmbeddingService {
                provider: provider.name().to_string(),
                message: format!("request timed out after {timeout:?}"),
            });
        }
    };
    if vectors.len() != texts.len() {
        error!(
            provider = provider.name(),
            expected = texts.len(),
            actual = vectors.len(),
            "embedding count mismatch"
        );
        return Err(RagError::EmbeddingService {
            provider: provider.name().to_string(),
            message: format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
        });
    }
    Ok(vectors)
}

/// Embed a single text under a deadline.
///
/// # Errors
///
/// Returns [`RagError::EmbeddingService`] on timeout or provider failure.
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>> {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(result) => result,
        Err(_) => {
            error!(provider = provider.name(), ?timeout, "embedding request timed out");
            Err(RagError::EmbeddingService {
                provider: provider.name().to_string(),
                message: format!("request timed out after {timeout:?}"),
            })
        }
    }
}
