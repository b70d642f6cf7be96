//! Batch dispatcher -- consume, fan out, join, settle.
//!
//! Each cycle pulls a bounded group of envelopes off the retry queue, runs
//! one download-engine task per referenced job concurrently, and settles the
//! group at the join barrier: acknowledge everything on full success, or
//! negative-acknowledge everything and republish only the failed ids with
//! their retry count incremented, until the envelope-level ceiling is
//! reached and the survivors are marked permanently failed.
//!
//! Retry bookkeeping is tracked per originating envelope: a job id belongs
//! to the first envelope in the batch that referenced it, and that
//! envelope's `retry_count`/`max_retries` govern its republication.


use crate::engine::{DownloadEngine, ProgressReporter};
use crate::error::{Error, Result};
use crate::queue::{Delivery, RetryQueue};
use crate::store::JobStore;
use crate::types::{BatchOutcome, Job, JobId, JobStatus};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Pulls bounded envelope groups and fans out concurrent engine runs
#[derive(Clone)]
pub struct BatchDispatcher {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn RetryQueue>,
    engine: Arc<DownloadEngine>,
    reporter: ProgressReporter,
    batch_size: usize,
}

impl BatchDispatcher {
    /// Create a dispatcher over the given store, queue, and engine
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn RetryQueue>,
        engine: Arc<DownloadEngine>,
        batch_size: usize,
    ) -> Self {
        let reporter = ProgressReporter::new(store.clone());
        Self {
            store,
            queue,
            engine,
            reporter,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one dispatch cycle
    ///
    /// Returns `Ok(None)` when the queue was idle, otherwise the cycle's
    /// [`BatchOutcome`]. Per-job failures never surface as an `Err` here;
    /// only store/queue infrastructure faults do.
    pub async fn run_cycle(&self) -> Result<Option<BatchOutcome>> {
        let deliveries = self.queue.consume(self.batch_size).await?;
        if deliveries.is_empty() {
            return Ok(None);
        }

        tracing::debug!(envelopes = deliveries.len(), "dispatch cycle started");

        let eligible = self.collect_eligible(&deliveries).await?;

        // Persist the in-flight transition before launching anything, so the
        // polling interface reflects it.
        for (job, _) in &eligible {
            self.reporter
                .persist(job.id, &job.filename, JobStatus::Downloading, 0)
                .await;
        }

        let (outcome, origins) = self.fan_out(eligible).await;

        if outcome.failed.is_empty() {
            for delivery in &deliveries {
                self.queue.ack(delivery).await?;
            }
            tracing::info!(
                completed = outcome.completed.len(),
                envelopes = deliveries.len(),
                "batch completed, envelopes acknowledged"
            );
        } else {
            self.settle_failed_batch(&deliveries, &outcome, &origins)
                .await?;
        }

        Ok(Some(outcome))
    }

    /// Resolve the batch's job ids into jobs worth attempting
    ///
    /// Deduplicates ids across envelopes (first occurrence owns the id) and
    /// skips ids whose job is missing or already completed. Each job is
    /// paired with the index of its originating delivery.
    async fn collect_eligible(&self, deliveries: &[Delivery]) -> Result<Vec<(Job, usize)>> {
        let mut seen = HashSet::new();
        let mut eligible = Vec::new();

        for (origin, delivery) in deliveries.iter().enumerate() {
            for &id in &delivery.envelope.job_ids {
                if !seen.insert(id) {
                    continue;
                }
                match self.store.get(id).await? {
                    None => {
                        tracing::warn!(job_id = %id, "envelope references a missing job, skipping");
                    }
                    Some(job) if job.status == JobStatus::Completed => {
                        tracing::debug!(
                            job_id = %id,
                            filename = %job.filename,
                            "job already completed, skipping"
                        );
                    }
                    Some(job) => eligible.push((job, origin)),
                }
            }
        }

        Ok(eligible)
    }

    /// Launch one engine task per job and join them all
    ///
    /// Returns the cycle outcome plus each job's originating-envelope index.
    async fn fan_out(
        &self,
        eligible: Vec<(Job, usize)>,
    ) -> (BatchOutcome, HashMap<JobId, usize>) {
        let mut join_set = JoinSet::new();
        let mut task_jobs: HashMap<tokio::task::Id, (JobId, usize)> = HashMap::new();

        for (job, origin) in eligible {
            let engine = self.engine.clone();
            let id = job.id;
            let handle = join_set.spawn(async move {
                engine.download(&job).await.map(|_| ()).map_err(|e| e.to_string())
            });
            task_jobs.insert(handle.id(), (id, origin));
        }

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((task_id, Ok(()))) => {
                    if let Some(&(job_id, _)) = task_jobs.get(&task_id) {
                        outcome.completed.push(job_id);
                    }
                }
                Ok((task_id, Err(message))) => {
                    if let Some(&(job_id, _)) = task_jobs.get(&task_id) {
                        tracing::error!(job_id = %job_id, error = %message, "download failed");
                        outcome.failed.push(job_id);
                        outcome.last_error = Some(message);
                    }
                }
                Err(join_error) => {
                    // A panicked task counts as that job's failure, never as
                    // a dispatcher crash.
                    if let Some(&(job_id, _)) = task_jobs.get(&join_error.id()) {
                        tracing::error!(
                            job_id = %job_id,
                            error = %join_error,
                            "download task aborted"
                        );
                        outcome.failed.push(job_id);
                        outcome.last_error = Some(join_error.to_string());
                    }
                }
            }
        }

        let origins = task_jobs.into_values().collect();
        (outcome, origins)
    }

    /// Nack every delivery, then republish or permanently fail per
    /// originating envelope
    async fn settle_failed_batch(
        &self,
        deliveries: &[Delivery],
        outcome: &BatchOutcome,
        origins: &HashMap<JobId, usize>,
    ) -> Result<()> {
        let total = outcome.completed.len() + outcome.failed.len();
        let batch_error = Error::Batch {
            failed: outcome.failed.len(),
            total,
        };
        for delivery in deliveries {
            self.queue.nack(delivery).await?;
        }
        tracing::error!(
            error = %batch_error,
            failed = ?outcome.failed,
            "batch processing failed, envelopes negative-acknowledged"
        );

        // Group failed ids by their originating envelope.
        let mut failed_by_origin: BTreeMap<usize, Vec<JobId>> = BTreeMap::new();
        for &id in &outcome.failed {
            let origin = origins.get(&id).copied().unwrap_or(0);
            failed_by_origin.entry(origin).or_default().push(id);
        }

        for (origin, failed_ids) in failed_by_origin {
            let envelope = &deliveries[origin].envelope;
            if envelope.can_retry() {
                let next = envelope.next_attempt(failed_ids.clone());
                let attempt = next.retry_count;
                self.queue.publish(next).await?;
                // Back to queued while a retry is pending, so the polling
                // interface keeps polling. Progress resets with the state.
                for &id in &failed_ids {
                    self.mark(id, JobStatus::Queued).await;
                }
                tracing::info!(
                    job_ids = ?failed_ids,
                    attempt,
                    max_retries = envelope.max_retries,
                    "retry scheduled"
                );
            } else {
                for &id in &failed_ids {
                    self.mark(id, JobStatus::Failed).await;
                }
                tracing::error!(
                    job_ids = ?failed_ids,
                    max_retries = envelope.max_retries,
                    "max retries exceeded, jobs permanently failed"
                );
            }
        }

        Ok(())
    }

    async fn mark(&self, id: JobId, status: JobStatus) {
        let filename = match self.store.get(id).await {
            Ok(Some(job)) => job.filename,
            _ => String::from("<unknown>"),
        };
        self.reporter.persist(id, &filename, status, 0).await;
    }
}
