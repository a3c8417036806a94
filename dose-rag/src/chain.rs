//! Retrieval-augmented answering chain.
//!
//! A [`RetrievalChain`] answers one question against a [`SegmentIndex`] in
//! four explicit stages:
//!
//! 1. **RewriteQuery**: turn a follow-up into a standalone question using
//!    the conversation history. Skipped, with no model call, when the
//!    history is empty. Failures degrade to the original question.
//! 2. **Retrieve**: embed the standalone question and take the top-k segments.
//! 3. **AssemblePrompt**: grounded system instruction, retrieved context,
//!    original question.
//! 4. **Generate**: one complete generation call.
//!
//! The chain holds no per-request state; history and index are passed in.
//! Each stage is public so it can be exercised on its own.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::conversation::{ConversationTurn, format_history};
use crate::document::{ChainResult, ScoredSegment};
use crate::embedding::{EmbeddingProvider, embed_with_timeout};
use crate::error::{ChainStage, RagError, Result};
use crate::generation::{ChatMessage, GenerationProvider, GenerationRequest, generate_with_timeout};
use crate::index::SegmentIndex;

/// System instruction for grounded answers.
///
/// The model must answer from the supplied context only and say so when
/// the context does not contain the answer.
pub const GROUNDED_SYSTEM_INSTRUCTION: &str = "You are DoSe, a helpful assistant for understanding \
documents. Answer the question using only the context provided by the user message. Do not use \
outside knowledge. If the context does not contain enough information to answer, say that the \
uploaded documents do not contain the answer.";

/// Instruction used to rewrite a follow-up question into a standalone one.
pub const REWRITE_SYSTEM_INSTRUCTION: &str = "Given the following conversation and a follow-up \
question, rephrase the follow-up question to be a standalone question. Include all context from \
the conversation that is needed to find relevant information in the documents. Reply with the \
standalone question only.";

/// The question actually used for retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandaloneQuestion {
    /// The text sent to retrieval.
    pub text: String,
    /// Whether the model produced `text` (false when the original was kept).
    pub rewritten: bool,
}

impl StandaloneQuestion {
    fn original(question: &str) -> Self {
        Self { text: question.to_string(), rewritten: false }
    }
}

/// The four-stage retrieval-augmented answering chain.
///
/// # Example
///
/// ```rust,ignore
/// use dose_rag::{RetrievalChain, RagConfig};
///
/// let chain = RetrievalChain::new(embedder, generator, &RagConfig::default());
/// let result = chain.invoke(&index, "What is the capital of France?", &[]).await?;
/// println!("{}", result.answer);
/// ```
pub struct RetrievalChain {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    top_k: usize,
    temperature: f32,
    timeout: Duration,
}

impl RetrievalChain {
    /// Create a chain using the retrieval and generation settings of `config`.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        config: &RagConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            top_k: config.top_k,
            temperature: config.temperature,
            timeout: config.request_timeout(),
        }
    }

    /// Run all stages and return the answer with the segments it was grounded on.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::AnsweringFailure`] tagged with the failing stage
    /// if retrieval or generation fails. Rewrite failures
    /// are never returned.
    pub async fn invoke(
        &self,
        index: &SegmentIndex,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<ChainResult> {
        let standalone = self.rewrite_query(question, history).await;

        let retrieved = self.retrieve(index, &standalone.text).await.map_err(|e| {
            error!(stage = %ChainStage::Retrieve, error = %e, "answering failed");
            RagError::answering(ChainStage::Retrieve, e)
        })?;

        let request = self.assemble_prompt(question, &retrieved);

        let answer = self.generate(request).await.map_err(|e| {
            error!(stage = %ChainStage::Generate, error = %e, "answering failed");
            RagError::answering(ChainStage::Generate, e)
        })?;

        info!(
            rewritten = standalone.rewritten,
            source_count = retrieved.len(),
            answer_len = answer.len(),
            "answered question"
        );

        Ok(ChainResult {
            answer,
            source_segments: retrieved.into_iter().map(|hit| hit.segment).collect(),
        })
    }

    /// RewriteQuery: produce the standalone question for retrieval.
    ///
    /// With empty history the original question is returned and the model is
    /// not called. A failed, timed-out or blank rewrite also falls back to
    /// the original question.
    pub async fn rewrite_query(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> StandaloneQuestion {
        if history.is_empty() {
            debug!("no history, skipping query rewrite");
            return StandaloneQuestion::original(question);
        }

        let request = GenerationRequest::new(vec![
            ChatMessage::system(REWRITE_SYSTEM_INSTRUCTION),
            ChatMessage::user(format!(
                "Chat History:\n{}\n\nFollow Up Question: {question}\n\nStandalone question:",
                format_history(history)
            )),
        ])
        .with_temperature(0.0);

        match generate_with_timeout(self.generator.as_ref(), request, self.timeout).await {
            Ok(text) if !text.trim().is_empty() => {
                let text = text.trim().to_string();
                debug!(original = question, standalone = %text, "rewrote follow-up question");
                StandaloneQuestion { text, rewritten: true }
            }
            Ok(_) => {
                warn!(stage = %ChainStage::RewriteQuery, "blank rewrite, using original question");
                StandaloneQuestion::original(question)
            }
            Err(e) => {
                warn!(
                    stage = %ChainStage::RewriteQuery,
                    error = %e,
                    "query rewrite failed, using original question"
                );
                StandaloneQuestion::original(question)
            }
        }
    }

    /// Retrieve: embed the standalone question and take the top-k segments.
    ///
    /// # Errors
    ///
    /// Returns the embedding or index error unwrapped; [`invoke`](Self::invoke)
    /// tags it with the stage.
    pub async fn retrieve(&self, index: &SegmentIndex, query: &str) -> Result<Vec<ScoredSegment>> {
        if index.is_empty() {
            debug!("empty index, nothing to retrieve");
            return Ok(Vec::new());
        }
        let query_embedding = embed_with_timeout(self.embedder.as_ref(), query, self.timeout).await?;
        let hits = index.query(&query_embedding, self.top_k)?;
        debug!(k = self.top_k, hit_count = hits.len(), "retrieved segments");
        Ok(hits)
    }

    /// AssemblePrompt: build the grounded generation request.
    ///
    /// The user message carries the retrieved segment texts as context,
    /// separated by blank lines in retrieval order, followed by the
    /// original question.
    pub fn assemble_prompt(&self, question: &str, retrieved: &[ScoredSegment]) -> GenerationRequest {
        let context = retrieved
            .iter()
            .map(|hit| hit.segment.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        GenerationRequest::new(vec![
            ChatMessage::system(GROUNDED_SYSTEM_INSTRUCTION),
            ChatMessage::user(format!("Context:\n{context}\n\nQuestion: {question}\n\nAnswer:")),
        ])
        .with_temperature(self.temperature)
    }

    /// Generate: one complete generation call.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationService`] on failure or timeout.
    pub async fn generate(&self, request: GenerationRequest) -> Result<String> {
        generate_with_timeout(self.generator.as_ref(), request, self.timeout).await
    }
}
