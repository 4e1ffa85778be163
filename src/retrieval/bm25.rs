//! BM25 (Okapi) lexical scoring over a per-query candidate pool.
//!
//! Document-frequency statistics are derived from exactly the candidate set
//! handed in — not from a corpus-wide inverted index. The dense retrieval
//! stage has already narrowed the pool to a small, topically relevant
//! subset, so the loss of global statistics is an accepted trade-off for
//! not maintaining an inverted index at all.
//!
//! Tokenization is an ASCII-whitespace split, case-sensitive, no stemming.
//! Scoring is stateless and deterministic: same query and candidates, same
//! scores.

use std::collections::{BTreeMap, HashMap};

const K1: f32 = 1.5;
const B: f32 = 0.75;
/// Negative IDF values (terms present in most of the pool) are floored to
/// `EPSILON * average_idf`, keeping common-term contributions small but
/// non-negative.
const EPSILON: f32 = 0.25;

fn tokenize(text: &str) -> Vec<&str> {
    text.split_ascii_whitespace().collect()
}

/// Scores each candidate against `query`. Output position `i` scores
/// candidate `i`. An empty candidate set yields an empty score list.
#[must_use]
pub fn score_candidates(query: &str, candidates: &[&str]) -> Vec<f32> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let docs: Vec<Vec<&str>> = candidates.iter().map(|text| tokenize(text)).collect();
    let corpus_size = docs.len() as f32;
    let total_len: usize = docs.iter().map(Vec::len).sum();
    let avgdl = if total_len == 0 {
        1.0
    } else {
        total_len as f32 / corpus_size
    };

    // Term frequency per document and document frequency across the pool.
    // The ordered map keeps IDF accumulation order (and thus the floating
    // point result) independent of hashing.
    let mut doc_freqs: Vec<HashMap<&str, usize>> = Vec::with_capacity(docs.len());
    let mut df: BTreeMap<&str, usize> = BTreeMap::new();
    for tokens in &docs {
        let mut freqs: HashMap<&str, usize> = HashMap::new();
        for &token in tokens {
            *freqs.entry(token).or_insert(0) += 1;
        }
        for &term in freqs.keys() {
            *df.entry(term).or_insert(0) += 1;
        }
        doc_freqs.push(freqs);
    }

    // Okapi IDF with the negative-value floor.
    let mut idf: BTreeMap<&str, f32> = BTreeMap::new();
    let mut idf_sum = 0.0f32;
    let mut negative_terms: Vec<&str> = Vec::new();
    for (&term, &freq) in &df {
        let value = ((corpus_size - freq as f32 + 0.5) / (freq as f32 + 0.5)).ln();
        idf_sum += value;
        if value < 0.0 {
            negative_terms.push(term);
        }
        idf.insert(term, value);
    }
    let average_idf = idf_sum / idf.len() as f32;
    let floor = EPSILON * average_idf;
    for term in negative_terms {
        idf.insert(term, floor);
    }

    let query_terms = tokenize(query);
    docs.iter()
        .enumerate()
        .map(|(i, tokens)| {
            let dl = tokens.len() as f32;
            let norm = K1 * (1.0 - B + B * dl / avgdl);
            query_terms
                .iter()
                .map(|term| {
                    let freq = doc_freqs[i].get(term).copied().unwrap_or(0) as f32;
                    if freq == 0.0 {
                        return 0.0;
                    }
                    let idf = idf.get(term).copied().unwrap_or(0.0);
                    idf * (freq * (K1 + 1.0)) / (freq + norm)
                })
                .sum()
        })
        .collect()
}
