//! Job store abstraction
//!
//! The engine and dispatcher never talk to a concrete persistence engine;
//! they go through [`JobStore`]. The crate ships two implementations:
//! the SQLite-backed [`Database`](crate::db::Database) and the in-memory
//! [`MemoryJobStore`] for tests and embedders that don't want a database
//! file.

use crate::error::{DatabaseError, Error, Result};
use crate::types::{Job, JobId, JobStatus, NewJob};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Repository interface over job records
///
/// Updates are flush-per-mutation; the design assumes a single writer at a
/// time per job (the dispatcher never schedules two concurrent attempts for
/// the same id).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job record with `status=pending, progress=0`, returning its id
    async fn create(&self, new_job: NewJob) -> Result<JobId>;

    /// Fetch a job by id, or `None` if no such record exists
    async fn get(&self, id: JobId) -> Result<Option<Job>>;

    /// Set a job's status and progress in one write
    async fn update_status(&self, id: JobId, status: JobStatus, progress: i32) -> Result<()>;

    /// Record the total byte length learned from a transfer response
    async fn set_content_length(&self, id: JobId, content_length: i64) -> Result<()>;

    /// List every job record, oldest first
    async fn list(&self) -> Result<Vec<Job>>;
}

/// In-memory [`JobStore`] backed by a mutex-guarded map
///
/// Intended for tests and short-lived embedders; records do not survive the
/// process.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    jobs: HashMap<i64, Job>,
    next_id: i64,
}

impl MemoryJobStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<JobId> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = JobId(inner.next_id);
        let now = chrono::Utc::now();

        inner.jobs.insert(
            id.get(),
            Job {
                id,
                filename: new_job.filename,
                url: new_job.url,
                status: JobStatus::Pending,
                progress: 0,
                content_length: None,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(&id.get()).cloned())
    }

    async fn update_status(&self, id: JobId, status: JobStatus, progress: i32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&id.get()).ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!("job {} not found", id)))
        })?;
        job.status = status;
        job.progress = progress;
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn set_content_length(&self, id: JobId, content_length: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&id.get()).ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!("job {} not found", id)))
        })?;
        job.content_length = Some(content_length);
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<Job> = inner.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }
}
