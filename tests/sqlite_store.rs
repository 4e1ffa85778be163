//! SQLite backend integration tests against a temporary database file.

use std::sync::Arc;

use tempfile::tempdir;

use ragforge::config::RagConfig;
use ragforge::embedding::MockEmbeddingProvider;
use ragforge::extract::ExtractorRegistry;
use ragforge::ingest::{IngestFile, IngestionPipeline};
use ragforge::stores::{Backend, NewChunk, NewDocument, SqliteBackend};
use ragforge::types::RagError;

fn doc(name: &str, digest_byte: char) -> NewDocument {
    NewDocument {
        filename: name.to_string(),
        content_type: "text/plain".to_string(),
        source_path: Some(format!("/srv/uploads/{name}")),
        content_sha256: std::iter::repeat(digest_byte).take(64).collect(),
    }
}

fn chunk(ordinal: usize, text: &str, embedding: Vec<f32>) -> NewChunk {
    NewChunk {
        ordinal,
        text: text.to_string(),
        start_char: ordinal * 100,
        end_char: ordinal * 100 + text.len(),
        embedding,
    }
}

async fn open_store(dir: &tempfile::TempDir, name: &str) -> SqliteBackend {
    SqliteBackend::open(dir.path().join(name)).await.unwrap()
}

#[tokio::test]
async fn insert_and_read_back_documents_and_chunks() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, "roundtrip.sqlite").await;

    let id = store
        .insert_document(
            doc("manual.txt", 'a'),
            vec![
                chunk(0, "first window", vec![1.0, 0.0, 0.0]),
                chunk(1, "second window", vec![0.0, 1.0, 0.0]),
            ],
        )
        .await
        .unwrap();

    let document = store.get_document(id).await.unwrap().unwrap();
    assert_eq!(document.filename, "manual.txt");
    assert_eq!(document.source_path.as_deref(), Some("/srv/uploads/manual.txt"));

    let chunks = store.get_chunks_by_document(id).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].ordinal, 0);
    assert_eq!(chunks[0].text, "first window");
    assert_eq!(chunks[0].embedding.as_deref(), Some(&[1.0f32, 0.0, 0.0][..]));
    assert_eq!(chunks[1].start_char, 100);

    let single = store.get_chunk(chunks[1].id).await.unwrap().unwrap();
    assert_eq!(single.text, "second window");
    assert!(store.get_chunk(9999).await.unwrap().is_none());
}

#[tokio::test]
async fn search_orders_by_similarity_with_id_tiebreak() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, "search.sqlite").await;

    store
        .insert_document(
            doc("axes.txt", 'b'),
            vec![
                chunk(0, "east", vec![1.0, 0.0]),
                chunk(1, "north", vec![0.0, 1.0]),
                chunk(2, "east twin", vec![1.0, 0.0]),
                chunk(3, "diagonal", vec![0.7, 0.7]),
            ],
        )
        .await
        .unwrap();

    let hits = store.search_similar(&[1.0, 0.0], 3).await.unwrap();
    assert_eq!(hits.len(), 3);
    // Exact matches tie; ascending rowid breaks the tie.
    assert_eq!(hits[0].text, "east");
    assert_eq!(hits[1].text, "east twin");
    assert!(hits[0].chunk_id < hits[1].chunk_id);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[2].score < hits[1].score);

    // k larger than the corpus returns what exists.
    let all = store.search_similar(&[0.0, 1.0], 50).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].text, "north");
}

#[tokio::test]
async fn delete_document_cascades_to_chunks() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, "cascade.sqlite").await;

    let keep = store
        .insert_document(doc("keep.txt", 'c'), vec![chunk(0, "keep", vec![1.0, 0.0])])
        .await
        .unwrap();
    let drop = store
        .insert_document(doc("drop.txt", 'd'), vec![chunk(0, "drop", vec![0.0, 1.0])])
        .await
        .unwrap();
    assert_eq!(store.chunk_count().await.unwrap(), 2);

    assert!(store.delete_document(drop).await.unwrap());
    assert!(!store.delete_document(drop).await.unwrap());
    assert_eq!(store.document_count().await.unwrap(), 1);
    assert_eq!(store.chunk_count().await.unwrap(), 1);
    assert!(store.get_document(keep).await.unwrap().is_some());
}

#[tokio::test]
async fn find_documents_by_digest() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, "digest.sqlite").await;

    store
        .insert_document(doc("one.txt", 'e'), Vec::new())
        .await
        .unwrap();
    store
        .insert_document(doc("copy-of-one.txt", 'e'), Vec::new())
        .await
        .unwrap();
    store
        .insert_document(doc("other.txt", 'f'), Vec::new())
        .await
        .unwrap();

    let digest: String = std::iter::repeat('e').take(64).collect();
    let matches = store.find_documents_by_digest(&digest).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert!(matches.iter().all(|d| d.content_sha256 == digest));
}

#[tokio::test]
async fn cache_put_ignores_duplicate_digests() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, "cache.sqlite").await;

    store.cache_put("digest-x", &[0.5, 0.25]).await.unwrap();
    // Second writer loses silently; no constraint error surfaces.
    store.cache_put("digest-x", &[9.0, 9.0]).await.unwrap();

    let cached = store
        .cache_get_many(&["digest-x".to_string(), "digest-y".to_string()])
        .await
        .unwrap();
    assert_eq!(cached[0].as_deref(), Some(&[0.5f32, 0.25][..]));
    assert!(cached[1].is_none());
}

#[tokio::test]
async fn duplicate_ordinal_in_one_document_is_a_constraint_violation() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, "constraint.sqlite").await;

    let err = store
        .insert_document(
            doc("dup.txt", 'a'),
            vec![
                chunk(0, "window a", vec![1.0, 0.0]),
                chunk(0, "window b", vec![0.0, 1.0]),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::ConstraintViolation(_)));

    // The transaction rolled back: no document, no chunks.
    assert_eq!(store.document_count().await.unwrap(), 0);
    assert_eq!(store.chunk_count().await.unwrap(), 0);
}

#[tokio::test]
async fn full_pipeline_over_sqlite() {
    let dir = tempdir().unwrap();
    let store = Arc::new(open_store(&dir, "pipeline.sqlite").await);
    let embedder = Arc::new(MockEmbeddingProvider::new());
    let pipeline = IngestionPipeline::new(
        store.clone(),
        embedder.clone(),
        ExtractorRegistry::with_defaults(),
        RagConfig::default(),
    );

    let body = "sqlite-backed retrieval pipeline test body. ".repeat(100);
    let id = pipeline
        .ingest_file(IngestFile::new("big.txt", body.into_bytes()))
        .await
        .unwrap();

    let chunks = store.get_chunks_by_document(id).await.unwrap();
    assert!(chunks.len() > 1);
    for (idx, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.ordinal, idx);
    }

    // Search with one chunk's own embedding finds that chunk first.
    let probe = chunks[0].embedding.clone().unwrap();
    let hits = store.search_similar(&probe, 3).await.unwrap();
    assert_eq!(hits[0].chunk_id, chunks[0].id);

    // Re-ingesting identical bytes reuses every cached embedding.
    let before = embedder.texts_embedded();
    let body = "sqlite-backed retrieval pipeline test body. ".repeat(100);
    pipeline
        .ingest_file(IngestFile::new("big-again.txt", body.into_bytes()))
        .await
        .unwrap();
    assert_eq!(embedder.texts_embedded(), before);
}
