//! Throttled, best-effort progress persistence.
//!
//! [`ProgressReporter`] wraps job-store writes so a persistence failure is
//! logged and swallowed, never aborting an in-flight transfer.
//! [`ProgressThrottle`] decides which percent values are worth persisting:
//! updates fire only when the new percent exceeds the last persisted one by
//! at least the configured step, bounding write amplification on the store.

use crate::store::JobStore;
use crate::types::{JobId, JobStatus};
use std::sync::Arc;

/// Best-effort status/progress persistence
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
}

impl ProgressReporter {
    /// Create a reporter over the given store
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Persist a status/progress update; failures are logged and swallowed
    pub async fn persist(&self, id: JobId, filename: &str, status: JobStatus, progress: i32) {
        match self.store.update_status(id, status, progress).await {
            Ok(()) => {
                tracing::debug!(
                    job_id = %id,
                    filename,
                    %status,
                    progress,
                    "job status updated"
                );
            }
            Err(e) => {
                tracing::error!(
                    job_id = %id,
                    filename,
                    %status,
                    progress,
                    error = %e,
                    "failed to update job status"
                );
            }
        }
    }

    /// Persist the total byte length learned from a response; best-effort
    pub async fn persist_content_length(&self, id: JobId, filename: &str, content_length: i64) {
        if let Err(e) = self.store.set_content_length(id, content_length).await {
            tracing::error!(
                job_id = %id,
                filename,
                content_length,
                error = %e,
                "failed to record content length"
            );
        }
    }
}

/// Percent computation and update throttling for one attempt
///
/// Tracks the last persisted percent, starting from the percent implied by
/// the resume offset, and yields a new value only on a step-sized increase.
#[derive(Debug)]
pub struct ProgressThrottle {
    step: i32,
    last_persisted: i32,
}

impl ProgressThrottle {
    /// Create a throttle for an attempt resuming at `offset` of `total` bytes
    pub fn new(step: i32, offset: u64, total: Option<u64>) -> Self {
        Self {
            step,
            last_persisted: percent_of(offset, total).unwrap_or(0),
        }
    }

    /// Feed the cumulative byte count; returns a percent to persist, or None
    /// if the update should be suppressed
    pub fn advance(&mut self, cumulative: u64, total: Option<u64>) -> Option<i32> {
        let percent = percent_of(cumulative, total)?;
        if percent - self.last_persisted >= self.step {
            self.last_persisted = percent;
            Some(percent)
        } else {
            None
        }
    }
}

/// Percent of `total` covered by `cumulative`, clamped to 100.
/// None when the total is unknown (unbounded transfer).
fn percent_of(cumulative: u64, total: Option<u64>) -> Option<i32> {
    let total = total?;
    if total == 0 {
        return Some(100);
    }
    // Clamp in u64 before narrowing; the cast can wrap negative otherwise.
    Some((cumulative.saturating_mul(100) / total).min(100) as i32)
}
