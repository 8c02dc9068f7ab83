//! In-memory job queue with a single background worker.
//!
//! OCR and embedding generation are CPU and memory heavy, so ingestion runs
//! strictly one document at a time: jobs are fed through an unbounded
//! channel and drained by one worker task, which also gives FIFO completion
//! order for free. Queue state lives only in this process; a restart loses
//! job history, which is accepted.
//!
//! A job never fails because its document failed extraction; those outcomes
//! land in the document status. A job fails only when the pipeline itself
//! errors (unknown document, database failure).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::QueueError;
use crate::ingest::{IngestionPipeline, IngestionSummary};
use crate::store::SqliteStore;

const IDLE_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// One scheduled unit of work. `result` mirrors the document's final
/// extraction summary once the job completes.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub document_id: String,
    pub case_id: String,
    pub file_name: String,
    pub state: JobState,
    pub progress: u8,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub result: Option<IngestionSummary>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Injectable queue abstraction so tests and embedders can substitute a
/// synchronous or canned implementation.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedule ingestion of a registered document. Fails only when the
    /// document id is unknown.
    async fn enqueue(&self, document_id: &str) -> Result<u64, QueueError>;

    /// Schedule a destructive reprocess (reset + rerun) of a document.
    async fn enqueue_reprocess(&self, document_id: &str) -> Result<u64, QueueError>;

    fn job(&self, job_id: u64) -> Option<Job>;

    fn stats(&self) -> QueueStats;

    /// Wait until no job is waiting or active.
    async fn drain(&self);
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Ingest,
    Reprocess,
}

struct QueueInner {
    jobs: Mutex<HashMap<u64, Job>>,
    tx: mpsc::UnboundedSender<(u64, JobKind)>,
    next_id: AtomicU64,
}

/// Default queue: one spawned worker draining an unbounded channel. The
/// single consumer is what enforces the at-most-one-active-job invariant.
pub struct SerialJobQueue {
    inner: Arc<QueueInner>,
    store: SqliteStore,
}

impl SerialJobQueue {
    pub fn start(pipeline: IngestionPipeline, store: SqliteStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(u64, JobKind)>();
        let inner = Arc::new(QueueInner {
            jobs: Mutex::new(HashMap::new()),
            tx,
            next_id: AtomicU64::new(0),
        });

        let worker_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some((job_id, kind)) = rx.recv().await {
                let document_id = {
                    let mut jobs = worker_inner.jobs.lock().unwrap();
                    match jobs.get_mut(&job_id) {
                        Some(job) => {
                            job.state = JobState::Active;
                            job.started_at = Some(Utc::now().timestamp());
                            job.progress = 10;
                            job.document_id.clone()
                        }
                        None => continue,
                    }
                };

                tracing::debug!(job = job_id, document = %document_id, "job started");

                let outcome = match kind {
                    JobKind::Ingest => pipeline.process_document(&document_id).await,
                    JobKind::Reprocess => pipeline.reprocess(&document_id).await,
                };

                let mut jobs = worker_inner.jobs.lock().unwrap();
                if let Some(job) = jobs.get_mut(&job_id) {
                    job.completed_at = Some(Utc::now().timestamp());
                    job.progress = 100;
                    match outcome {
                        Ok(summary) => {
                            job.state = JobState::Completed;
                            job.result = Some(summary);
                        }
                        Err(error) => {
                            job.state = JobState::Failed;
                            job.error = Some(error.to_string());
                        }
                    }
                }
            }
        });

        Self { inner, store }
    }

    async fn enqueue_kind(&self, document_id: &str, kind: JobKind) -> Result<u64, QueueError> {
        let doc = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(document_id.to_string()))?;

        let job_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job = Job {
            id: job_id,
            document_id: doc.id,
            case_id: doc.case_id,
            file_name: doc.file_name,
            state: JobState::Waiting,
            progress: 0,
            created_at: Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        };

        self.inner.jobs.lock().unwrap().insert(job_id, job);
        self.inner
            .tx
            .send((job_id, kind))
            .map_err(|_| QueueError::Closed)?;

        Ok(job_id)
    }
}

#[async_trait]
impl JobQueue for SerialJobQueue {
    async fn enqueue(&self, document_id: &str) -> Result<u64, QueueError> {
        self.enqueue_kind(document_id, JobKind::Ingest).await
    }

    async fn enqueue_reprocess(&self, document_id: &str) -> Result<u64, QueueError> {
        self.enqueue_kind(document_id, JobKind::Reprocess).await
    }

    fn job(&self, job_id: u64) -> Option<Job> {
        self.inner.jobs.lock().unwrap().get(&job_id).cloned()
    }

    fn stats(&self) -> QueueStats {
        let jobs = self.inner.jobs.lock().unwrap();
        let mut stats = QueueStats::default();
        for job in jobs.values() {
            match job.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Active => stats.active += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    async fn drain(&self) {
        loop {
            let stats = self.stats();
            if stats.waiting == 0 && stats.active == 0 {
                return;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }
}
