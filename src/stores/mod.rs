//! Storage backends for documents, chunks, and the embedding cache.
//!
//! The pipeline works against the async [`Backend`] trait, which bundles the
//! three storage concerns the core needs: document/chunk CRUD with cascade
//! delete, cosine nearest-neighbor search over chunk embeddings, and the
//! content-addressed embedding cache with insert-or-ignore writes.
//!
//! ```text
//!                     ┌─────────────────┐
//!                     │  Backend trait  │
//!                     │  (async CRUD +  │
//!                     │   ANN + cache)  │
//!                     └────────┬────────┘
//!                              │
//!                    ┌─────────┴─────────┐
//!                    ▼                   ▼
//!             ┌─────────────┐     ┌─────────────┐
//!             │   SQLite    │     │   Memory    │
//!             │ sqlite-vec  │     │ brute-force │
//!             └─────────────┘     └─────────────┘
//! ```

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RagError;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// A document to be persisted, before an id is assigned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewDocument {
    pub filename: String,
    pub content_type: String,
    pub source_path: Option<String>,
    /// SHA-256 hex digest of the raw file bytes; duplicate detection is
    /// caller policy, not a store constraint.
    pub content_sha256: String,
}

/// A chunk to be persisted alongside its parent document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewChunk {
    pub ordinal: usize,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub embedding: Vec<f32>,
}

/// A persisted document row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub filename: String,
    pub content_type: String,
    pub source_path: Option<String>,
    pub content_sha256: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted chunk row. The embedding is loaded only where a read path
/// needs it; `None` means "not fetched", never "not computed".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: i64,
    pub document_id: i64,
    pub ordinal: usize,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// One nearest-neighbor match from the vector index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorHit {
    pub chunk_id: i64,
    pub text: String,
    /// `1 - cosine_distance`; higher is more similar.
    pub score: f32,
}

/// Unified contract the pipeline requires from a store.
///
/// Implementations must guarantee:
/// - [`insert_document`](Self::insert_document) is atomic: either the
///   document and all of its chunks become visible, or none do.
/// - [`delete_document`](Self::delete_document) cascades to the document's
///   chunks.
/// - [`search_similar`](Self::search_similar) orders by descending score and
///   breaks ties by ascending chunk id (insertion order).
/// - [`cache_put`](Self::cache_put) ignores duplicate digests, keeping the
///   existing row (concurrent writers of content-equal values are harmless).
///
/// Transient failures are reported as [`RagError::StoreUnavailable`];
/// integrity errors as [`RagError::ConstraintViolation`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Persists a document and all of its chunks in one atomic operation,
    /// returning the new document id.
    async fn insert_document(
        &self,
        document: NewDocument,
        chunks: Vec<NewChunk>,
    ) -> Result<i64, RagError>;

    async fn get_document(&self, id: i64) -> Result<Option<DocumentRecord>, RagError>;

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, RagError>;

    /// Documents whose whole-file digest matches, for duplicate detection.
    async fn find_documents_by_digest(
        &self,
        content_sha256: &str,
    ) -> Result<Vec<DocumentRecord>, RagError>;

    /// Deletes a document and, by cascade, its chunks. Returns whether a
    /// document row existed.
    async fn delete_document(&self, id: i64) -> Result<bool, RagError>;

    async fn get_chunk(&self, id: i64) -> Result<Option<ChunkRecord>, RagError>;

    /// All chunks of one document, ordered by ordinal.
    async fn get_chunks_by_document(&self, document_id: i64)
    -> Result<Vec<ChunkRecord>, RagError>;

    /// Top-`k` chunks by cosine similarity to `query_embedding`.
    async fn search_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, RagError>;

    /// Cache lookup for a batch of digests; the output slot at position `i`
    /// answers the digest at position `i`.
    async fn cache_get_many(
        &self,
        digests: &[String],
    ) -> Result<Vec<Option<Vec<f32>>>, RagError>;

    /// Insert-or-ignore cache write keyed by content digest.
    async fn cache_put(&self, digest: &str, embedding: &[f32]) -> Result<(), RagError>;

    async fn document_count(&self) -> Result<usize, RagError>;

    async fn chunk_count(&self) -> Result<usize, RagError>;
}
