//! Query-time retrieval: dense search, lexical rescoring, fusion.
//!
//! ```text
//! question ──► embed (1 call) ──► vector index top-N ──┐
//!                                                      ├─► fuse ──► top-K
//!                        BM25 over the candidate pool ─┘
//! ```
//!
//! The [`Retriever`] owns the wiring; the scoring stages themselves
//! ([`bm25`], [`fusion`]) are pure functions.

pub mod bm25;
pub mod fusion;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::retry::{RetryPolicy, with_retry};
use crate::stores::Backend;
use crate::types::RagError;

pub use fusion::FusionWeights;

/// One ranked retrieval match. Ephemeral — produced per query, never
/// persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: i64,
    pub text: String,
    /// `1 - cosine_distance` from the vector index.
    pub dense_score: f32,
    /// BM25 score over the candidate pool; `None` when hybrid mode is off.
    pub lexical_score: Option<f32>,
    /// Weighted combination used for the final ranking.
    pub fused_score: f32,
}

/// Executes the retrieval pipeline for one question at a time.
pub struct Retriever {
    store: Arc<dyn Backend>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn Backend>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            retry,
        }
    }

    /// Retrieves the top results for `question`.
    ///
    /// The question is embedded once, the vector index supplies the
    /// `vector_top_k` candidate pool, and — in hybrid mode — BM25 scores
    /// computed over exactly that pool are fused with the dense scores.
    /// Model and store calls are retried per the configured policy.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievalResult>, RagError> {
        let query = vec![question.to_string()];
        let query_embedding = with_retry(&self.retry, "embed_query", || {
            self.embedder.embed_batch(&query)
        })
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            RagError::ModelUnavailable("model returned no embedding for the query".to_string())
        })?;

        let hits = with_retry(&self.retry, "vector_search", || {
            self.store
                .search_similar(&query_embedding, self.config.vector_top_k)
        })
        .await?;

        tracing::debug!(
            candidates = hits.len(),
            hybrid = self.config.bm25_enable,
            "vector search complete"
        );

        let weights = FusionWeights {
            vector: self.config.vector_weight,
            lexical: self.config.lexical_weight,
        };

        let results = if self.config.bm25_enable {
            let texts: Vec<&str> = hits.iter().map(|hit| hit.text.as_str()).collect();
            let lexical = bm25::score_candidates(question, &texts);
            fusion::fuse(
                hits,
                Some(&lexical),
                weights,
                self.config.rerank_top_k,
                self.config.final_top_k,
            )
        } else {
            fusion::fuse(hits, None, weights, self.config.rerank_top_k, self.config.final_top_k)
        };

        Ok(results)
    }
}
