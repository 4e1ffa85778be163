//! Asynchronous ingestion job queue.
//!
//! Long-running batch ingestion (directory uploads) is offloaded here:
//! [`JobQueue::enqueue`] returns a job id immediately and a background
//! worker drains the queue, retrying transient failures up to the
//! configured limit before marking a job permanently failed. Status is
//! queryable by id for the lifetime of the queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ingest::{IngestFile, IngestionPipeline};
use crate::types::RagError;

/// Lifecycle of one queued ingestion.
#[derive(Clone, Debug, PartialEq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded { document_id: i64 },
    Failed { error: String },
}

impl JobStatus {
    /// Whether the job has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. } | JobStatus::Failed { .. })
    }
}

struct JobRequest {
    id: Uuid,
    file: IngestFile,
}

/// Handle to the background ingestion worker.
pub struct JobQueue {
    tx: mpsc::UnboundedSender<JobRequest>,
    statuses: Arc<RwLock<HashMap<Uuid, JobStatus>>>,
    worker: tokio::task::JoinHandle<()>,
}

impl JobQueue {
    /// Spawns the worker task. `retry_limit` bounds the attempts made per
    /// job for retryable errors; non-retryable errors fail the job at once.
    #[must_use]
    pub fn start(pipeline: Arc<IngestionPipeline>, retry_limit: u32) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobRequest>();
        let statuses: Arc<RwLock<HashMap<Uuid, JobStatus>>> = Arc::new(RwLock::new(HashMap::new()));

        let worker_statuses = statuses.clone();
        let worker = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                worker_statuses
                    .write()
                    .insert(request.id, JobStatus::Running);

                let attempts = retry_limit.max(1);
                let mut outcome: Result<i64, RagError> =
                    Err(RagError::StoreUnavailable("job never ran".to_string()));
                for attempt in 1..=attempts {
                    outcome = pipeline.ingest_file(request.file.clone()).await;
                    match &outcome {
                        Ok(_) => break,
                        Err(err) if err.is_retryable() && attempt < attempts => {
                            tracing::warn!(
                                job_id = %request.id,
                                attempt,
                                error = %err,
                                "ingestion job attempt failed, retrying"
                            );
                            tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
                        }
                        Err(_) => break,
                    }
                }

                let status = match outcome {
                    Ok(document_id) => {
                        tracing::info!(job_id = %request.id, document_id, "ingestion job succeeded");
                        JobStatus::Succeeded { document_id }
                    }
                    Err(err) => {
                        tracing::warn!(job_id = %request.id, error = %err, "ingestion job failed");
                        JobStatus::Failed {
                            error: err.to_string(),
                        }
                    }
                };
                worker_statuses.write().insert(request.id, status);
            }
        });

        Self {
            tx,
            statuses,
            worker,
        }
    }

    /// Queues one file for ingestion and returns its job id immediately.
    pub fn enqueue(&self, file: IngestFile) -> Result<Uuid, RagError> {
        let id = Uuid::new_v4();
        self.statuses.write().insert(id, JobStatus::Queued);
        self.tx
            .send(JobRequest { id, file })
            .map_err(|_| RagError::StoreUnavailable("job queue worker stopped".to_string()))?;
        Ok(id)
    }

    /// Current status of a job, or `None` for an unknown id.
    #[must_use]
    pub fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.statuses.read().get(&id).cloned()
    }

    /// Stops accepting work and waits for queued jobs to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}
