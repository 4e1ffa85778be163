//! ```text
//! Ingestion:
//!   bytes ──► extract::ExtractorRegistry ──► chunker::chunk_text ──┐
//!                                                                  │
//!   embedding::cache (digest lookup ─► batched misses ─► model) ◄──┘
//!                        │
//!                        ▼
//!   stores::Backend::insert_document (document + chunks, one transaction)
//!
//! Query:
//!   question ──► embed ──► stores::Backend::search_similar ──┐
//!                                                            ├─► retrieval::fusion
//!                       retrieval::bm25 (candidate pool) ────┘         │
//!                                                                      ▼
//!   answer::QueryEngine ──► completion model ──► Answer + citations
//! ```
//!
pub mod answer;
pub mod chunker;
pub mod completion;
pub mod config;
pub mod digest;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod jobs;
pub mod retrieval;
pub mod retry;
pub mod stores;
pub mod types;

pub use answer::{Answer, Citation, QueryEngine};
pub use chunker::{ChunkSpan, chunk_text};
pub use completion::{CompletionProvider, MockCompletionProvider, OpenAiChatCompletion};
pub use config::{ChunkingConfig, RagConfig, RetrievalConfig};
pub use embedding::{
    CacheOutcome, EmbeddingProvider, MockEmbeddingProvider, RigEmbeddingProvider,
    resolve_embeddings,
};
pub use extract::{ContentType, ExtractorRegistry, TextExtractor};
pub use ingest::{IngestFile, IngestReport, IngestionPipeline};
pub use jobs::{JobQueue, JobStatus};
pub use retrieval::{RetrievalResult, Retriever};
pub use retry::RetryPolicy;
pub use stores::{Backend, MemoryBackend, SqliteBackend};
pub use types::RagError;
