//! Ingestion orchestration.
//!
//! One document moves through a linear state machine with no branching back:
//!
//! ```text
//! RECEIVED ──► PARSED ──► CHUNKED ──► EMBEDDED ──► PERSISTED
//! ```
//!
//! Extraction is delegated to the [`ExtractorRegistry`], chunking to the
//! [`chunker`](crate::chunker), embedding to the cache-aware resolver, and
//! persistence to the store — which commits the document and all of its
//! chunks in one transaction, so a mid-write failure leaves nothing behind.
//!
//! Batch ingestion isolates failures per file: an unsupported sibling never
//! aborts the rest of the batch.

use std::sync::Arc;

use crate::chunker::{ChunkSpan, chunk_text};
use crate::config::RagConfig;
use crate::digest::sha256_hex;
use crate::embedding::{EmbeddingProvider, resolve_embeddings};
use crate::extract::{ContentType, ExtractorRegistry};
use crate::retry::with_retry;
use crate::stores::{Backend, NewChunk, NewDocument};
use crate::types::RagError;

/// One file submitted for ingestion.
#[derive(Clone, Debug)]
pub struct IngestFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub source_path: Option<String>,
}

impl IngestFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            source_path: None,
        }
    }

    #[must_use]
    pub fn with_source_path(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }
}

/// Per-file outcome of a batch ingestion.
#[derive(Debug)]
pub struct IngestReport {
    pub filename: String,
    pub result: Result<i64, RagError>,
}

/// Drives extract → chunk → embed → persist for one document at a time.
pub struct IngestionPipeline {
    store: Arc<dyn Backend>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractors: ExtractorRegistry,
    config: RagConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn Backend>,
        embedder: Arc<dyn EmbeddingProvider>,
        extractors: ExtractorRegistry,
        config: RagConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            extractors,
            config,
        }
    }

    /// Ingests one document and returns its id.
    ///
    /// All chunks are embedded in one batch (through the cache when
    /// enabled) and persisted atomically with the document row. The
    /// whole-file digest is stored for duplicate detection, which remains
    /// caller policy: re-ingesting identical bytes creates a new document
    /// but reuses every cached embedding.
    pub async fn ingest_file(&self, file: IngestFile) -> Result<i64, RagError> {
        let content_type = ContentType::detect(&file.filename);
        tracing::info!(
            filename = %file.filename,
            content_type = content_type.as_mime(),
            size_bytes = file.bytes.len(),
            "ingestion received"
        );

        let text = self.extractors.extract(&file.bytes, content_type)?;
        tracing::debug!(text_chars = text.chars().count(), "ingestion parsed");

        let spans = chunk_text(&text, &self.config.chunking);
        tracing::debug!(chunk_count = spans.len(), "ingestion chunked");

        let embeddings = self.embed_spans(&spans).await?;
        debug_assert_eq!(embeddings.len(), spans.len());

        let content_sha256 = sha256_hex(&file.bytes);
        let document = NewDocument {
            filename: file.filename.clone(),
            content_type: content_type.as_mime().to_string(),
            source_path: file.source_path.clone(),
            content_sha256,
        };
        let chunks: Vec<NewChunk> = spans
            .into_iter()
            .zip(embeddings)
            .map(|(span, embedding)| NewChunk {
                ordinal: span.ordinal,
                text: span.text,
                start_char: span.start_char,
                end_char: span.end_char,
                embedding,
            })
            .collect();

        let chunk_count = chunks.len();
        let document_id = with_retry(&self.config.retry, "persist_document", || {
            self.store.insert_document(document.clone(), chunks.clone())
        })
        .await?;

        tracing::info!(document_id, chunk_count, "ingestion persisted");
        Ok(document_id)
    }

    /// Ingests several files, isolating failures per file.
    pub async fn ingest_batch(&self, files: Vec<IngestFile>) -> Vec<IngestReport> {
        let mut reports = Vec::with_capacity(files.len());
        for file in files {
            let filename = file.filename.clone();
            let result = self.ingest_file(file).await;
            if let Err(err) = &result {
                tracing::warn!(filename = %filename, error = %err, "file ingestion failed");
            }
            reports.push(IngestReport { filename, result });
        }
        reports
    }

    async fn embed_spans(&self, spans: &[ChunkSpan]) -> Result<Vec<Vec<f32>>, RagError> {
        if spans.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = spans.iter().map(|span| span.text.clone()).collect();

        if self.config.embed_cache_enable {
            let outcome = with_retry(&self.config.retry, "resolve_embeddings", || {
                resolve_embeddings(self.store.as_ref(), self.embedder.as_ref(), &texts)
            })
            .await?;
            tracing::debug!(
                cache_hits = outcome.cache_hits,
                cache_misses = outcome.cache_misses,
                "ingestion embedded"
            );
            Ok(outcome.embeddings)
        } else {
            with_retry(&self.config.retry, "embed_chunks", || {
                self.embedder.embed_batch(&texts)
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::stores::MemoryBackend;

    fn pipeline(
        store: Arc<MemoryBackend>,
        embedder: Arc<MockEmbeddingProvider>,
    ) -> IngestionPipeline {
        IngestionPipeline::new(
            store,
            embedder,
            ExtractorRegistry::with_defaults(),
            RagConfig::default(),
        )
    }

    #[tokio::test]
    async fn ingest_persists_document_and_ordered_chunks() {
        let store = Arc::new(MemoryBackend::new());
        let embedder = Arc::new(MockEmbeddingProvider::new());
        let pipeline = pipeline(store.clone(), embedder);

        let body = "paragraph one.\r\nparagraph two.\r\n".repeat(200);
        let id = pipeline
            .ingest_file(IngestFile::new("doc.txt", body.into_bytes()))
            .await
            .unwrap();

        let document = store.get_document(id).await.unwrap().unwrap();
        assert_eq!(document.content_type, "text/plain");
        assert_eq!(document.content_sha256.len(), 64);

        let chunks = store.get_chunks_by_document(id).await.unwrap();
        assert!(chunks.len() > 1);
        for (idx, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, idx);
        }
        for pair in chunks.windows(2) {
            assert!(pair[0].start_char <= pair[1].start_char);
        }
    }

    #[tokio::test]
    async fn empty_file_persists_a_document_with_no_chunks() {
        let store = Arc::new(MemoryBackend::new());
        let embedder = Arc::new(MockEmbeddingProvider::new());
        let pipeline = pipeline(store.clone(), embedder.clone());

        let id = pipeline
            .ingest_file(IngestFile::new("empty.txt", Vec::new()))
            .await
            .unwrap();
        assert!(store.get_document(id).await.unwrap().is_some());
        assert_eq!(store.chunk_count().await.unwrap(), 0);
        assert_eq!(embedder.batches(), 0);
    }

    #[tokio::test]
    async fn unsupported_format_fails_that_file_only() {
        let store = Arc::new(MemoryBackend::new());
        let embedder = Arc::new(MockEmbeddingProvider::new());
        let pipeline = pipeline(store.clone(), embedder);

        let reports = pipeline
            .ingest_batch(vec![
                IngestFile::new("good.txt", b"some text content".to_vec()),
                IngestFile::new("bad.zip", vec![0x50, 0x4b]),
                IngestFile::new("also-good.md", b"# heading\nbody".to_vec()),
            ])
            .await;

        assert_eq!(reports.len(), 3);
        assert!(reports[0].result.is_ok());
        assert!(matches!(
            reports[1].result,
            Err(RagError::UnsupportedFormat(_))
        ));
        assert!(reports[2].result.is_ok());
        assert_eq!(store.document_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn identical_text_across_documents_hits_the_cache() {
        let store = Arc::new(MemoryBackend::new());
        let embedder = Arc::new(MockEmbeddingProvider::new());
        let pipeline = pipeline(store.clone(), embedder.clone());

        let bytes = b"the same document body".to_vec();
        pipeline
            .ingest_file(IngestFile::new("first.txt", bytes.clone()))
            .await
            .unwrap();
        pipeline
            .ingest_file(IngestFile::new("second.txt", bytes))
            .await
            .unwrap();

        // One chunk each, identical text: the model embeds it exactly once.
        assert_eq!(embedder.texts_embedded(), 1);
        assert_eq!(store.document_count().await.unwrap(), 2);
        assert_eq!(store.chunk_count().await.unwrap(), 2);
    }
}
