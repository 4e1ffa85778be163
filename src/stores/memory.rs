//! In-memory backend with brute-force cosine search.
//!
//! Used by the test suites and for small embedded corpora where spinning up
//! SQLite is not worth it. Semantics mirror the SQLite backend exactly:
//! atomic document+chunk insertion, cascade delete, descending-score search
//! with ascending-id tie-breaks, and insert-or-ignore cache writes.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{Backend, ChunkRecord, DocumentRecord, NewChunk, NewDocument, VectorHit};
use crate::types::RagError;

#[derive(Default)]
struct State {
    documents: BTreeMap<i64, DocumentRecord>,
    chunks: BTreeMap<i64, ChunkRecord>,
    cache: HashMap<String, Vec<f32>>,
    next_document_id: i64,
    next_chunk_id: i64,
}

/// Process-local [`Backend`] implementation.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert_document(
        &self,
        document: NewDocument,
        chunks: Vec<NewChunk>,
    ) -> Result<i64, RagError> {
        let now = Utc::now();
        let mut state = self.state.write();
        state.next_document_id += 1;
        let document_id = state.next_document_id;
        state.documents.insert(
            document_id,
            DocumentRecord {
                id: document_id,
                filename: document.filename,
                content_type: document.content_type,
                source_path: document.source_path,
                content_sha256: document.content_sha256,
                created_at: now,
            },
        );
        for chunk in chunks {
            state.next_chunk_id += 1;
            let chunk_id = state.next_chunk_id;
            state.chunks.insert(
                chunk_id,
                ChunkRecord {
                    id: chunk_id,
                    document_id,
                    ordinal: chunk.ordinal,
                    text: chunk.text,
                    start_char: chunk.start_char,
                    end_char: chunk.end_char,
                    embedding: Some(chunk.embedding),
                    created_at: now,
                },
            );
        }
        Ok(document_id)
    }

    async fn get_document(&self, id: i64) -> Result<Option<DocumentRecord>, RagError> {
        Ok(self.state.read().documents.get(&id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, RagError> {
        Ok(self.state.read().documents.values().cloned().collect())
    }

    async fn find_documents_by_digest(
        &self,
        content_sha256: &str,
    ) -> Result<Vec<DocumentRecord>, RagError> {
        Ok(self
            .state
            .read()
            .documents
            .values()
            .filter(|doc| doc.content_sha256 == content_sha256)
            .cloned()
            .collect())
    }

    async fn delete_document(&self, id: i64) -> Result<bool, RagError> {
        let mut state = self.state.write();
        let existed = state.documents.remove(&id).is_some();
        if existed {
            state.chunks.retain(|_, chunk| chunk.document_id != id);
        }
        Ok(existed)
    }

    async fn get_chunk(&self, id: i64) -> Result<Option<ChunkRecord>, RagError> {
        Ok(self.state.read().chunks.get(&id).cloned())
    }

    async fn get_chunks_by_document(
        &self,
        document_id: i64,
    ) -> Result<Vec<ChunkRecord>, RagError> {
        let mut chunks: Vec<ChunkRecord> = self
            .state
            .read()
            .chunks
            .values()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.ordinal);
        Ok(chunks)
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, RagError> {
        let state = self.state.read();
        let mut scored: Vec<VectorHit> = state
            .chunks
            .values()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                Some(VectorHit {
                    chunk_id: chunk.id,
                    text: chunk.text.clone(),
                    score: cosine_similarity(embedding, query_embedding),
                })
            })
            .collect();
        // Descending score; ascending chunk id on exact ties.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn cache_get_many(
        &self,
        digests: &[String],
    ) -> Result<Vec<Option<Vec<f32>>>, RagError> {
        let state = self.state.read();
        Ok(digests
            .iter()
            .map(|digest| state.cache.get(digest).cloned())
            .collect())
    }

    async fn cache_put(&self, digest: &str, embedding: &[f32]) -> Result<(), RagError> {
        // Insert-or-ignore: the first writer wins, duplicates are dropped.
        self.state
            .write()
            .cache
            .entry(digest.to_string())
            .or_insert_with(|| embedding.to_vec());
        Ok(())
    }

    async fn document_count(&self) -> Result<usize, RagError> {
        Ok(self.state.read().documents.len())
    }

    async fn chunk_count(&self) -> Result<usize, RagError> {
        Ok(self.state.read().chunks.len())
    }
}
