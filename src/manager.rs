//! Owning facade over the store, queue, engine, and dispatcher.
//!
//! `DownloadManager` wires the pieces together and owns the dispatch loop
//! as an explicit task: no global event loop, so several managers (and
//! tests) can run side by side. It also carries the external collaborator
//! operations -- job submission, bulk enqueue, and the progress snapshot --
//! that the REST layer exposes.

use crate::config::Config;
use crate::db::Database;
use crate::dispatcher::BatchDispatcher;
use crate::engine::DownloadEngine;
use crate::error::{Error, Result};
use crate::queue::{MemoryQueue, RetryQueue};
use crate::store::JobStore;
use crate::types::{Job, JobId, JobStatus, NewJob, ProgressSnapshot, RetryEnvelope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main download manager instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DownloadManager {
    /// Configuration this manager was built with
    pub config: Arc<Config>,
    /// Job store shared with the engine and dispatcher.
    /// Public for integration tests to query job state.
    pub store: Arc<dyn JobStore>,
    queue: Arc<dyn RetryQueue>,
    dispatcher: BatchDispatcher,
    accepting_new: Arc<AtomicBool>,
    cancel: CancellationToken,
    dispatch_loop: Arc<tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl DownloadManager {
    /// Create a manager with the default SQLite store and in-memory queue
    pub async fn new(config: Config) -> Result<Self> {
        let db = Database::new(&config.database_path).await?;
        let queue = MemoryQueue::new();
        Self::with_parts(config, Arc::new(db), Arc::new(queue)).await
    }

    /// Create a manager over caller-supplied store and queue implementations
    pub async fn with_parts(
        config: Config,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn RetryQueue>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.staging_dir).await?;
        tokio::fs::create_dir_all(&config.final_dir).await?;

        let engine = Arc::new(DownloadEngine::new(&config, store.clone())?);
        let dispatcher = BatchDispatcher::new(
            store.clone(),
            queue.clone(),
            engine,
            config.batch.batch_size,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            queue,
            dispatcher,
            accepting_new: Arc::new(AtomicBool::new(true)),
            cancel: CancellationToken::new(),
            dispatch_loop: Arc::new(tokio::sync::Mutex::new(None)),
        })
    }

    /// Create a job record with `status=pending, progress=0`
    ///
    /// The filename keys the staging and final locations, so it must be
    /// unique across live jobs (caller invariant).
    pub async fn submit(&self, filename: &str, url: &str) -> Result<JobId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        url::Url::parse(url)?;

        let id = self
            .store
            .create(NewJob {
                filename: filename.to_string(),
                url: url.to_string(),
            })
            .await?;

        tracing::info!(job_id = %id, filename, url, "job submitted");
        Ok(id)
    }

    /// Transition jobs to `queued` and publish one envelope referencing all
    /// of them
    pub async fn enqueue(&self, ids: &[JobId]) -> Result<()> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if ids.is_empty() {
            return Ok(());
        }

        for &id in ids {
            let job = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
            // Queued resets progress; completed jobs pass through and get
            // short-circuited by the engine on delivery.
            self.store
                .update_status(job.id, JobStatus::Queued, 0)
                .await?;
        }

        let envelope = RetryEnvelope::new(ids.to_vec(), self.config.batch.max_retries);
        self.queue.publish(envelope).await?;
        tracing::info!(job_ids = ?ids, "jobs enqueued for download");
        Ok(())
    }

    /// Fetch one job record
    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        self.store.get(id).await
    }

    /// List every job record
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.store.list().await
    }

    /// Snapshot for the progress-polling interface
    ///
    /// `should_poll` is true while any job is queued or downloading.
    pub async fn progress(&self) -> Result<ProgressSnapshot> {
        let jobs = self.store.list().await?;
        let should_poll = jobs.iter().any(|j| j.status.is_active());
        Ok(ProgressSnapshot {
            jobs: jobs.iter().map(Into::into).collect(),
            should_poll,
        })
    }

    /// Start the dispatch loop; idempotent
    pub async fn start(&self) {
        let mut guard = self.dispatch_loop.lock().await;
        if guard.is_some() {
            return;
        }

        let dispatcher = self.dispatcher.clone();
        let cancel = self.cancel.clone();
        let poll_interval = self.config.batch.poll_interval();

        let handle = tokio::spawn(async move {
            tracing::info!("dispatch loop started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("dispatch loop stopping");
                        break;
                    }
                    cycle = dispatcher.run_cycle() => {
                        match cycle {
                            Ok(Some(outcome)) => {
                                tracing::debug!(
                                    completed = outcome.completed.len(),
                                    failed = outcome.failed.len(),
                                    "dispatch cycle settled"
                                );
                            }
                            Ok(None) => {
                                tokio::select! {
                                    _ = cancel.cancelled() => break,
                                    _ = tokio::time::sleep(poll_interval) => {}
                                }
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "dispatch cycle failed");
                                tokio::select! {
                                    _ = cancel.cancelled() => break,
                                    _ = tokio::time::sleep(poll_interval) => {}
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(handle);
    }

    /// Gracefully shut down the manager
    ///
    /// Stops accepting new work, cancels the dispatch loop, and waits for
    /// the in-flight cycle to settle (with a timeout).
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating graceful shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        let handle = self.dispatch_loop.lock().await.take();
        if let Some(handle) = handle {
            let shutdown_timeout = std::time::Duration::from_secs(30);
            match tokio::time::timeout(shutdown_timeout, handle).await {
                Ok(Ok(())) => tracing::info!("dispatch loop stopped"),
                Ok(Err(e)) => tracing::warn!(error = %e, "dispatch loop task failed"),
                Err(_) => {
                    tracing::warn!("timeout waiting for dispatch loop, proceeding with shutdown")
                }
            }
        }

        tracing::info!("shutdown complete");
        Ok(())
    }

    /// Run dispatch cycles until the queue is idle or `max_cycles` is hit
    ///
    /// Intended for batch-style embedders and tests; the long-running path
    /// is [`start`](Self::start).
    pub async fn drain(&self, max_cycles: usize) -> Result<usize> {
        let mut cycles = 0;
        while cycles < max_cycles {
            match self.dispatcher.run_cycle().await? {
                Some(_) => cycles += 1,
                None => break,
            }
        }
        Ok(cycles)
    }
}
