use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::{Connection, ErrorCode, OptionalExtension, ffi};

use super::{Backend, ChunkRecord, DocumentRecord, NewChunk, NewDocument, VectorHit};
use crate::types::RagError;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    content_type TEXT NOT NULL,
    source_path TEXT,
    content_sha256 TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_sha ON documents(content_sha256);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    ordinal INTEGER NOT NULL,
    text TEXT NOT NULL,
    start_char INTEGER NOT NULL,
    end_char INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(document_id, ordinal)
);
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

CREATE TABLE IF NOT EXISTS embedding_cache (
    sha256 TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL
);
";

/// SQLite [`Backend`] with cosine nearest-neighbor search via `sqlite-vec`.
///
/// Embeddings are stored as little-endian float32 blobs, the format
/// `vec_distance_cosine` consumes directly. Document+chunk insertion runs in
/// one transaction; chunk deletion rides on `ON DELETE CASCADE`.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Opens (creating if needed) the database at `path` and prepares the
    /// schema. The `sqlite-vec` extension is registered process-wide on
    /// first use.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::StoreUnavailable(err.to_string()))?;
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))?;
            // journal_mode returns the resulting mode as a row.
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
                row.get::<_, String>(0)
            })?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_store_err)?;
        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), RagError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(RagError::StoreUnavailable)
    }
}

fn map_store_err(err: tokio_rusqlite::Error) -> RagError {
    if let tokio_rusqlite::Error::Error(inner) = &err {
        if inner.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
            return RagError::ConstraintViolation(err.to_string());
        }
    }
    RagError::StoreUnavailable(err.to_string())
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn blob_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn parse_created_at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

const DOCUMENT_COLUMNS: &str =
    "id, filename, content_type, source_path, content_sha256, created_at";
const CHUNK_COLUMNS: &str =
    "id, document_id, ordinal, text, start_char, end_char, embedding, created_at";

#[async_trait]
impl Backend for SqliteBackend {
    async fn insert_document(
        &self,
        document: NewDocument,
        chunks: Vec<NewChunk>,
    ) -> Result<i64, RagError> {
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()?;
                tx.execute(
                    "INSERT INTO documents (filename, content_type, source_path, content_sha256, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    (
                        &document.filename,
                        &document.content_type,
                        &document.source_path,
                        &document.content_sha256,
                        &created_at,
                    ),
                )?;
                let document_id = tx.last_insert_rowid();
                {
                    let mut stmt = tx
                        .prepare(
                            "INSERT INTO chunks (document_id, ordinal, text, start_char, end_char, embedding, created_at) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        )?;
                    for chunk in &chunks {
                        stmt.execute((
                            document_id,
                            chunk.ordinal as i64,
                            &chunk.text,
                            chunk.start_char as i64,
                            chunk.end_char as i64,
                            embedding_to_blob(&chunk.embedding),
                            &created_at,
                        ))?;
                    }
                }
                tx.commit()?;
                Ok(document_id)
            })
            .await
            .map_err(map_store_err)
    }

    async fn get_document(&self, id: i64) -> Result<Option<DocumentRecord>, RagError> {
        self.conn
            .call(move |conn| {
                conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
                ))?
                .query_row([id], |row| {
                    Ok(DocumentRecord {
                        id: row.get(0)?,
                        filename: row.get(1)?,
                        content_type: row.get(2)?,
                        source_path: row.get(3)?,
                        content_sha256: row.get(4)?,
                        created_at: parse_created_at(&row.get::<_, String>(5)?),
                    })
                })
                .optional()            })
            .await
            .map_err(map_store_err)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, RagError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY id ASC"
                    ))?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(DocumentRecord {
                            id: row.get(0)?,
                            filename: row.get(1)?,
                            content_type: row.get(2)?,
                            source_path: row.get(3)?,
                            content_sha256: row.get(4)?,
                            created_at: parse_created_at(&row.get::<_, String>(5)?),
                        })
                    })?;
                let mut documents = Vec::new();
                for row in rows {
                    documents.push(row?);
                }
                Ok(documents)
            })
            .await
            .map_err(map_store_err)
    }

    async fn find_documents_by_digest(
        &self,
        content_sha256: &str,
    ) -> Result<Vec<DocumentRecord>, RagError> {
        let digest = content_sha256.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE content_sha256 = ?1 ORDER BY id ASC"
                    ))?;
                let rows = stmt
                    .query_map([&digest], |row| {
                        Ok(DocumentRecord {
                            id: row.get(0)?,
                            filename: row.get(1)?,
                            content_type: row.get(2)?,
                            source_path: row.get(3)?,
                            content_sha256: row.get(4)?,
                            created_at: parse_created_at(&row.get::<_, String>(5)?),
                        })
                    })?;
                let mut documents = Vec::new();
                for row in rows {
                    documents.push(row?);
                }
                Ok(documents)
            })
            .await
            .map_err(map_store_err)
    }

    async fn delete_document(&self, id: i64) -> Result<bool, RagError> {
        self.conn
            .call(move |conn| {
                let deleted = conn
                    .execute("DELETE FROM documents WHERE id = ?1", [id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(map_store_err)
    }

    async fn get_chunk(&self, id: i64) -> Result<Option<ChunkRecord>, RagError> {
        self.conn
            .call(move |conn| {
                conn.prepare(&format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?1"))?
                    .query_row([id], |row| {
                        Ok(ChunkRecord {
                            id: row.get(0)?,
                            document_id: row.get(1)?,
                            ordinal: row.get::<_, i64>(2)? as usize,
                            text: row.get(3)?,
                            start_char: row.get::<_, i64>(4)? as usize,
                            end_char: row.get::<_, i64>(5)? as usize,
                            embedding: Some(blob_to_embedding(&row.get::<_, Vec<u8>>(6)?)),
                            created_at: parse_created_at(&row.get::<_, String>(7)?),
                        })
                    })
                    .optional()
                                })
            .await
            .map_err(map_store_err)
    }

    async fn get_chunks_by_document(
        &self,
        document_id: i64,
    ) -> Result<Vec<ChunkRecord>, RagError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {CHUNK_COLUMNS} FROM chunks WHERE document_id = ?1 ORDER BY ordinal ASC"
                    ))?;
                let rows = stmt
                    .query_map([document_id], |row| {
                        Ok(ChunkRecord {
                            id: row.get(0)?,
                            document_id: row.get(1)?,
                            ordinal: row.get::<_, i64>(2)? as usize,
                            text: row.get(3)?,
                            start_char: row.get::<_, i64>(4)? as usize,
                            end_char: row.get::<_, i64>(5)? as usize,
                            embedding: Some(blob_to_embedding(&row.get::<_, Vec<u8>>(6)?)),
                            created_at: parse_created_at(&row.get::<_, String>(7)?),
                        })
                    })?;
                let mut chunks = Vec::new();
                for row in rows {
                    chunks.push(row?);
                }
                Ok(chunks)
            })
            .await
            .map_err(map_store_err)
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, RagError> {
        let embedding_json = serde_json::to_string(query_embedding)
            .map_err(|err| RagError::StoreUnavailable(err.to_string()))?;
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, text, vec_distance_cosine(embedding, vec_f32(?1)) AS distance \
                         FROM chunks \
                         ORDER BY distance ASC, id ASC \
                         LIMIT ?2",
                    )?;
                let rows = stmt
                    .query_map((&embedding_json, k as i64), |row| {
                        let distance: f32 = row.get(2)?;
                        Ok(VectorHit {
                            chunk_id: row.get(0)?,
                            text: row.get(1)?,
                            // Cosine distance to similarity: higher is closer.
                            score: 1.0 - distance,
                        })
                    })?;
                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
            .map_err(map_store_err)
    }

    async fn cache_get_many(
        &self,
        digests: &[String],
    ) -> Result<Vec<Option<Vec<f32>>>, RagError> {
        let digests = digests.to_vec();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT embedding FROM embedding_cache WHERE sha256 = ?1")?;
                let mut cached = Vec::with_capacity(digests.len());
                for digest in &digests {
                    let blob = stmt
                        .query_row([digest], |row| row.get::<_, Vec<u8>>(0))
                        .optional()?;
                    cached.push(blob.map(|bytes| blob_to_embedding(&bytes)));
                }
                Ok(cached)
            })
            .await
            .map_err(map_store_err)
    }

    async fn cache_put(&self, digest: &str, embedding: &[f32]) -> Result<(), RagError> {
        let digest = digest.to_string();
        let blob = embedding_to_blob(embedding);
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                // Concurrent misses for the same text race to insert the
                // same value; the first writer wins and the rest are no-ops.
                conn.execute(
                    "INSERT OR IGNORE INTO embedding_cache (sha256, embedding, created_at) \
                     VALUES (?1, ?2, ?3)",
                    (&digest, &blob, &created_at),
                )?;
                Ok(())
            })
            .await
            .map_err(map_store_err)
    }

    async fn document_count(&self) -> Result<usize, RagError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(map_store_err)
    }

    async fn chunk_count(&self) -> Result<usize, RagError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(map_store_err)
    }
}
