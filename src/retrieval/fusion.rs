//! Fusion of dense and lexical relevance signals.
//!
//! Candidates arrive in vector-rank order (descending dense score, ties by
//! ascending chunk id). Fusion computes a weighted sum per candidate, stable
//! sorts on it, and truncates twice: first to the rerank pool size, then to
//! the number of results returned to the caller. The two truncations are
//! independently configurable so a caller can widen the rerank pool without
//! widening responses.

use super::RetrievalResult;
use crate::stores::VectorHit;

/// Relative weights of the dense and lexical scores.
#[derive(Clone, Copy, Debug)]
pub struct FusionWeights {
    pub vector: f32,
    pub lexical: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.6,
            lexical: 0.4,
        }
    }
}

/// Merges vector hits with per-candidate lexical scores into the final
/// ranked list.
///
/// `lexical_scores`, when present, pairs with `vector_results` by position
/// and must be the same length. When `None` (hybrid mode disabled) the
/// input order is returned untouched, truncated to `final_k`.
///
/// Determinism: the sort is stable and the combined score is a pure
/// function of the inputs, so ties keep their original vector-rank order
/// and repeated calls produce identical output.
#[must_use]
pub fn fuse(
    vector_results: Vec<VectorHit>,
    lexical_scores: Option<&[f32]>,
    weights: FusionWeights,
    rerank_pool_size: usize,
    final_k: usize,
) -> Vec<RetrievalResult> {
    let Some(lexical_scores) = lexical_scores else {
        return vector_results
            .into_iter()
            .take(final_k)
            .map(|hit| RetrievalResult {
                chunk_id: hit.chunk_id,
                text: hit.text,
                dense_score: hit.score,
                lexical_score: None,
                fused_score: hit.score,
            })
            .collect();
    };

    debug_assert_eq!(vector_results.len(), lexical_scores.len());
    let mut fused: Vec<RetrievalResult> = vector_results
        .into_iter()
        .zip(lexical_scores.iter().copied())
        .map(|(hit, lexical)| RetrievalResult {
            chunk_id: hit.chunk_id,
            dense_score: hit.score,
            lexical_score: Some(lexical),
            fused_score: weights.vector * hit.score + weights.lexical * lexical,
            text: hit.text,
        })
        .collect();

    // Stable: equal fused scores keep vector-rank order.
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(rerank_pool_size);
    fused.truncate(final_k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(chunk_id: i64, score: f32) -> VectorHit {
        VectorHit {
            chunk_id,
            text: format!("chunk {chunk_id}"),
            score,
        }
    }

    #[test]
    fn weighted_sum_matches_default_weights() {
        let results = fuse(
            vec![hit(1, 1.0), hit(2, 0.0)],
            Some(&[0.0, 1.0]),
            FusionWeights::default(),
            10,
            10,
        );
        // vector=1.0/lexical=0.0 -> 0.6 outranks vector=0.0/lexical=1.0 -> 0.4
        assert_eq!(results[0].chunk_id, 1);
        assert!((results[0].fused_score - 0.6).abs() < 1e-6);
        assert_eq!(results[1].chunk_id, 2);
        assert!((results[1].fused_score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn fusion_is_deterministic() {
        let vector: Vec<VectorHit> = (0..8).map(|i| hit(i, 1.0 - i as f32 * 0.1)).collect();
        let lexical: Vec<f32> = (0..8).map(|i| (i as f32 * 0.7).sin().abs()).collect();
        let first = fuse(
            vector.clone(),
            Some(&lexical),
            FusionWeights::default(),
            6,
            4,
        );
        let second = fuse(vector, Some(&lexical), FusionWeights::default(), 6, 4);
        let ids: Vec<i64> = first.iter().map(|r| r.chunk_id).collect();
        let ids_again: Vec<i64> = second.iter().map(|r| r.chunk_id).collect();
        assert_eq!(ids, ids_again);
    }

    #[test]
    fn ties_keep_vector_rank_order() {
        // Identical fused scores: order must match the input (vector) order.
        let results = fuse(
            vec![hit(7, 0.5), hit(3, 0.5), hit(9, 0.5)],
            Some(&[0.5, 0.5, 0.5]),
            FusionWeights::default(),
            10,
            10,
        );
        let ids: Vec<i64> = results.iter().map(|r| r.chunk_id).collect();
        assert_eq!(ids, vec![7, 3, 9]);
    }

    #[test]
    fn lexical_can_overturn_vector_order() {
        let results = fuse(
            vec![hit(1, 0.55), hit(2, 0.50)],
            Some(&[0.0, 0.9]),
            FusionWeights::default(),
            10,
            10,
        );
        // 0.6*0.50 + 0.4*0.9 = 0.66 beats 0.6*0.55 = 0.33
        assert_eq!(results[0].chunk_id, 2);
    }

    #[test]
    fn two_stage_truncation() {
        let vector: Vec<VectorHit> = (0..10).map(|i| hit(i, 1.0 - i as f32 * 0.05)).collect();
        let lexical = vec![0.0; 10];
        let results = fuse(vector, Some(&lexical), FusionWeights::default(), 5, 3);
        assert_eq!(results.len(), 3);

        // rerank pool smaller than final_k: the pool bounds the response
        let vector: Vec<VectorHit> = (0..10).map(|i| hit(i, 1.0 - i as f32 * 0.05)).collect();
        let lexical = vec![0.0; 10];
        let results = fuse(vector, Some(&lexical), FusionWeights::default(), 2, 5);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn disabled_lexical_returns_vector_order_truncated() {
        let vector: Vec<VectorHit> = (0..6).map(|i| hit(i * 10, 0.9 - i as f32 * 0.1)).collect();
        let results = fuse(vector.clone(), None, FusionWeights::default(), 10, 4);
        assert_eq!(results.len(), 4);
        for (result, hit) in results.iter().zip(vector.iter()) {
            assert_eq!(result.chunk_id, hit.chunk_id);
            assert_eq!(result.fused_score, hit.score);
            assert!(result.lexical_score.is_none());
        }
    }

    #[test]
    fn empty_candidates_fuse_to_empty() {
        assert!(fuse(Vec::new(), Some(&[]), FusionWeights::default(), 5, 5).is_empty());
        assert!(fuse(Vec::new(), None, FusionWeights::default(), 5, 5).is_empty());
    }
}
