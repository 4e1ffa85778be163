//! Embedding model collaborators.
//!
//! The pipeline talks to embedding models through [`EmbeddingProvider`]:
//! batch in, vectors out, order preserved. Two implementations ship with the
//! crate — a deterministic [`MockEmbeddingProvider`] for tests and offline
//! runs, and [`RigEmbeddingProvider`], an adapter over any
//! [`rig::embeddings::EmbeddingModel`] for real providers.

pub mod cache;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rig::embeddings::EmbeddingModel;

use crate::types::RagError;

pub use cache::{CacheOutcome, resolve_embeddings};

/// Batch embedding collaborator.
///
/// The output vector at position `i` embeds the input text at position `i`;
/// every vector has exactly [`dims`](Self::dims) components. An empty batch
/// is a caller error ([`RagError::InvalidInput`]) — callers that can see
/// empty batches (the cache resolver) short-circuit before getting here.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed dimensionality of the produced vectors.
    fn dims(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Deterministic hash-derived embeddings for tests and offline pipelines.
///
/// Identical text always produces an identical vector and distinct texts
/// almost always differ, which is enough to exercise cache and ranking
/// behavior without a model. Call counters let tests assert how much work
/// reached the "model".
pub struct MockEmbeddingProvider {
    dims: usize,
    batches: AtomicUsize,
    texts_embedded: AtomicUsize,
}

impl MockEmbeddingProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::with_dims(8)
    }

    #[must_use]
    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims,
            batches: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
        }
    }

    /// Number of `embed_batch` calls that reached this provider.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Total number of texts embedded across all batches.
    pub fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    fn hash_to_vec(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();
        (0..self.dims)
            .map(|i| {
                let bits = seed.rotate_left((i as u32 % 64) * 8) ^ ((i as u64) << 24);
                (bits as f64 / u32::MAX as f64) as f32
            })
            .collect()
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Err(RagError::InvalidInput("empty embedding batch".to_string()));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| self.hash_to_vec(text)).collect())
    }
}

/// Adapter exposing any `rig` embedding model as an [`EmbeddingProvider`].
///
/// Transport and provider errors are mapped to
/// [`RagError::ModelUnavailable`] so the orchestration boundary can retry
/// them; a response with the wrong cardinality is treated the same way.
pub struct RigEmbeddingProvider<M> {
    model: M,
}

impl<M> RigEmbeddingProvider<M>
where
    M: EmbeddingModel,
{
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M> EmbeddingProvider for RigEmbeddingProvider<M>
where
    M: EmbeddingModel + Send + Sync,
{
    fn dims(&self) -> usize {
        self.model.ndims()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Err(RagError::InvalidInput("empty embedding batch".to_string()));
        }
        let embeddings = self
            .model
            .embed_texts(texts.to_vec())
            .await
            .map_err(|err| RagError::ModelUnavailable(err.to_string()))?;
        if embeddings.len() != texts.len() {
            return Err(RagError::ModelUnavailable(format!(
                "model returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings
            .into_iter()
            .map(|embedding| embedding.vec.into_iter().map(|v| v as f32).collect())
            .collect())
    }
}
