//! Content-addressed embedding resolution.
//!
//! `resolve_embeddings` is the cache-aware path from chunk texts to vectors:
//! each text is keyed by its SHA-256 digest, cached vectors are reused, and
//! all misses go to the model in one batched call. Cache I/O is strictly an
//! efficiency concern — a failing read degrades to a miss and a failing
//! write is logged and swallowed; neither affects the vectors returned for
//! the current call.

use crate::digest::sha256_hex;
use crate::embedding::EmbeddingProvider;
use crate::stores::Backend;
use crate::types::RagError;

/// Per-slot resolution state. A slot is never represented by a sentinel
/// value (such as an empty vector): it is either still pending or carries
/// the resolved embedding.
enum Slot {
    Pending,
    Resolved(Vec<f32>),
}

/// Result of one resolution pass.
#[derive(Clone, Debug)]
pub struct CacheOutcome {
    /// Vector `i` embeds input text `i`.
    pub embeddings: Vec<Vec<f32>>,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

/// Resolves embeddings for `texts`, consulting and populating the cache.
///
/// Guarantees:
/// - Output order mirrors input order regardless of the hit/miss split.
/// - All misses are embedded in a single model call.
/// - An empty input returns an empty outcome without touching the model.
/// - Identical texts resolve to value-equal vectors across calls and
///   documents; after the first resolution the model is not consulted again
///   for that text (unless the best-effort cache write was lost).
pub async fn resolve_embeddings(
    store: &dyn Backend,
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<CacheOutcome, RagError> {
    if texts.is_empty() {
        return Ok(CacheOutcome {
            embeddings: Vec::new(),
            cache_hits: 0,
            cache_misses: 0,
        });
    }

    let digests: Vec<String> = texts.iter().map(|text| sha256_hex(text.as_bytes())).collect();

    // A failed cache read only costs recomputation; treat every slot as a
    // miss rather than failing the resolve.
    let cached = match store.cache_get_many(&digests).await {
        Ok(cached) => cached,
        Err(err) => {
            tracing::warn!(error = %err, "embedding cache read failed; treating all as misses");
            vec![None; texts.len()]
        }
    };

    let mut slots: Vec<Slot> = Vec::with_capacity(texts.len());
    let mut miss_indices: Vec<usize> = Vec::new();
    for (idx, entry) in cached.into_iter().enumerate() {
        match entry {
            Some(embedding) => slots.push(Slot::Resolved(embedding)),
            None => {
                slots.push(Slot::Pending);
                miss_indices.push(idx);
            }
        }
    }

    let cache_hits = texts.len() - miss_indices.len();
    let cache_misses = miss_indices.len();

    if !miss_indices.is_empty() {
        let miss_texts: Vec<String> = miss_indices.iter().map(|&idx| texts[idx].clone()).collect();
        let computed = provider.embed_batch(&miss_texts).await?;
        if computed.len() != miss_texts.len() {
            return Err(RagError::ModelUnavailable(format!(
                "model returned {} embeddings for {} miss texts",
                computed.len(),
                miss_texts.len()
            )));
        }

        for (&idx, embedding) in miss_indices.iter().zip(computed.into_iter()) {
            if let Err(err) = store.cache_put(&digests[idx], &embedding).await {
                tracing::warn!(
                    digest = %digests[idx],
                    error = %err,
                    "embedding cache write failed; returning vector uncached"
                );
            }
            slots[idx] = Slot::Resolved(embedding);
        }
    }

    let mut embeddings = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            Slot::Resolved(embedding) => embeddings.push(embedding),
            Slot::Pending => {
                // Unreachable: every miss index was filled above.
                return Err(RagError::ModelUnavailable(
                    "unresolved embedding slot after miss resolution".to_string(),
                ));
            }
        }
    }

    tracing::debug!(cache_hits, cache_misses, "resolved embeddings");
    Ok(CacheOutcome {
        embeddings,
        cache_hits,
        cache_misses,
    })
}
