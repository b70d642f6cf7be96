//! Download engine -- one resumable HTTP transfer of one job.
//!
//! Split into focused submodules:
//! - [`progress`] - Throttled, best-effort progress persistence
//!
//! An engine call runs one attempt to completion or failure:
//! idempotent short-circuit on an existing final artifact, resume-offset
//! computation from the staging artifact, a streaming GET with exact byte
//! accounting (`Accept-Encoding: identity`), append-mode staging writes,
//! throttled progress updates, and atomic promotion of the finished file.
//! Transport-level failures (no response obtained) are retried inline with
//! the same resume offset; everything after a response is single-shot.

pub mod progress;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use progress::{ProgressReporter, ProgressThrottle};

use crate::config::Config;
use crate::error::{DownloadError, Result};
use crate::store::JobStore;
use crate::types::{Job, JobStatus};
use futures::StreamExt;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Result of a successful engine call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The transfer ran and the artifact was promoted
    Completed,
    /// A final artifact already existed; no network request was issued
    AlreadyCompleted,
}

/// Performs one resumable transfer of one job against its source URL
#[derive(Clone)]
pub struct DownloadEngine {
    client: reqwest::Client,
    reporter: ProgressReporter,
    staging_dir: PathBuf,
    final_dir: PathBuf,
    transport_attempts: u32,
    progress_step: i32,
}

impl DownloadEngine {
    /// Build an engine from config, sharing the given job store
    pub fn new(config: &Config, store: Arc<dyn JobStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.transfer.connect_timeout())
            .user_agent(config.transfer.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            reporter: ProgressReporter::new(store),
            staging_dir: config.staging_dir.clone(),
            final_dir: config.final_dir.clone(),
            transport_attempts: config.transfer.transport_attempts.max(1),
            progress_step: config.transfer.progress_step,
        })
    }

    /// Staging location for a job's filename
    pub fn staging_path(&self, filename: &str) -> PathBuf {
        self.staging_dir.join(filename)
    }

    /// Final location for a job's filename
    pub fn final_path(&self, filename: &str) -> PathBuf {
        self.final_dir.join(filename)
    }

    /// Run one download attempt for `job`
    ///
    /// On success the staging artifact has been promoted and the job is
    /// marked `completed` with progress 100. On failure the job is marked
    /// `failed` and the classified [`DownloadError`] is returned; the
    /// staging artifact is preserved for a future resume wherever the bytes
    /// already written are still valid.
    pub async fn download(&self, job: &Job) -> Result<AttemptOutcome> {
        let final_path = self.final_path(&job.filename);
        let staging_path = self.staging_path(&job.filename);

        // Presence in the final directory is the sole source of truth for
        // completion; redelivered envelopes land here.
        if path_exists(&final_path).await {
            tracing::info!(
                job_id = %job.id,
                filename = %job.filename,
                "final artifact already present, skipping transfer"
            );
            self.reporter
                .persist(job.id, &job.filename, JobStatus::Completed, 100)
                .await;
            return Ok(AttemptOutcome::AlreadyCompleted);
        }

        self.reporter
            .persist(job.id, &job.filename, JobStatus::Downloading, 0)
            .await;

        let mut last_transport_error = String::new();
        for attempt in 1..=self.transport_attempts {
            // A partially written staging file survives transport retries,
            // so the offset is recomputed per attempt.
            let offset = staging_len(&staging_path).await;

            tracing::info!(
                job_id = %job.id,
                filename = %job.filename,
                url = %job.url,
                offset,
                attempt,
                "starting download attempt"
            );

            let mut request = self
                .client
                .get(&job.url)
                .header(ACCEPT_ENCODING, "identity");
            if offset > 0 {
                request = request.header(RANGE, format!("bytes={}-", offset));
            }

            match request.send().await {
                Ok(response) => {
                    return self
                        .consume_response(job, response, offset, &staging_path, &final_path)
                        .await;
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.id,
                        filename = %job.filename,
                        attempt,
                        error = %e,
                        "transport failure before response"
                    );
                    last_transport_error = e.to_string();
                }
            }
        }

        tracing::error!(
            job_id = %job.id,
            filename = %job.filename,
            attempts = self.transport_attempts,
            error = %last_transport_error,
            "download failed at transport level, retries exhausted"
        );
        self.reporter
            .persist(job.id, &job.filename, JobStatus::Failed, 0)
            .await;
        Err(DownloadError::Transport {
            attempts: self.transport_attempts,
            message: last_transport_error,
        }
        .into())
    }

    /// Validate the response, stream the body into staging, and promote
    async fn consume_response(
        &self,
        job: &Job,
        response: reqwest::Response,
        offset: u64,
        staging_path: &Path,
        final_path: &Path,
    ) -> Result<AttemptOutcome> {
        let status = response.status();

        // A resumed attempt requires byte-range support; anything but 206
        // means the server would replay the whole body over our offset.
        if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            tracing::error!(
                job_id = %job.id,
                filename = %job.filename,
                status = status.as_u16(),
                offset,
                "server does not support resuming downloads"
            );
            self.reporter
                .persist(job.id, &job.filename, JobStatus::Failed, 0)
                .await;
            return Err(DownloadError::ResumeUnsupported {
                status: status.as_u16(),
            }
            .into());
        }

        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            tracing::error!(
                job_id = %job.id,
                filename = %job.filename,
                status = status.as_u16(),
                "unexpected HTTP status"
            );
            self.reporter
                .persist(job.id, &job.filename, JobStatus::Failed, 0)
                .await;
            return Err(DownloadError::HttpStatus {
                status: status.as_u16(),
            }
            .into());
        }

        let total = total_length(&response, offset);
        if let Some(total) = total {
            self.reporter
                .persist_content_length(job.id, &job.filename, total as i64)
                .await;
        }

        tracing::info!(
            job_id = %job.id,
            filename = %job.filename,
            status = status.as_u16(),
            total = ?total,
            offset,
            "download response received"
        );

        match self
            .write_stream(job, response, offset, total, staging_path)
            .await
        {
            Ok(cumulative) => {
                if let Some(total) = total {
                    if cumulative < total {
                        tracing::error!(
                            job_id = %job.id,
                            filename = %job.filename,
                            received = cumulative,
                            expected = total,
                            "incomplete transfer"
                        );
                        self.reporter
                            .persist(job.id, &job.filename, JobStatus::Failed, 0)
                            .await;
                        return Err(DownloadError::IncompleteTransfer {
                            expected: total,
                            received: cumulative,
                        }
                        .into());
                    }
                }

                self.promote(job, staging_path, final_path).await?;
                Ok(AttemptOutcome::Completed)
            }
            Err(e) => {
                self.reporter
                    .persist(job.id, &job.filename, JobStatus::Failed, 0)
                    .await;
                Err(e)
            }
        }
    }

    /// Append the response body to the staging artifact, reporting throttled
    /// progress; returns the cumulative byte count (offset + received)
    async fn write_stream(
        &self,
        job: &Job,
        response: reqwest::Response,
        offset: u64,
        total: Option<u64>,
        staging_path: &Path,
    ) -> Result<u64> {
        if let Some(parent) = staging_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(staging_path)
            .await?;

        let mut cumulative = offset;
        let mut throttle = ProgressThrottle::new(self.progress_step, offset, total);
        let mut stream = response.bytes_stream();

        while let Some(next) = stream.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!(
                        job_id = %job.id,
                        filename = %job.filename,
                        error = %e,
                        "download stream error"
                    );
                    return Err(DownloadError::Stream(e.to_string()).into());
                }
            };

            let written = match append_chunk(&mut file, &chunk).await {
                Ok(written) => written,
                Err(e) => {
                    tracing::error!(
                        job_id = %job.id,
                        filename = %job.filename,
                        error = %e,
                        "failed writing to staging artifact"
                    );
                    return Err(e);
                }
            };

            cumulative += written as u64;

            if let Some(percent) = throttle.advance(cumulative, total) {
                self.reporter
                    .persist(job.id, &job.filename, JobStatus::Downloading, percent)
                    .await;
            }
        }

        file.flush().await?;
        Ok(cumulative)
    }

    /// Atomically promote the staging artifact to its final location
    async fn promote(&self, job: &Job, staging_path: &Path, final_path: &Path) -> Result<()> {
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::Promotion(e.to_string()))?;
        }

        if let Err(e) = tokio::fs::rename(staging_path, final_path).await {
            tracing::error!(
                job_id = %job.id,
                filename = %job.filename,
                staging_path = %staging_path.display(),
                final_path = %final_path.display(),
                error = %e,
                "failed to promote completed artifact"
            );
            self.reporter
                .persist(job.id, &job.filename, JobStatus::Failed, 0)
                .await;
            return Err(DownloadError::Promotion(e.to_string()).into());
        }

        self.reporter
            .persist(job.id, &job.filename, JobStatus::Completed, 100)
            .await;
        tracing::info!(
            job_id = %job.id,
            filename = %job.filename,
            final_path = %final_path.display(),
            "download completed and promoted"
        );
        Ok(())
    }
}

/// Write one chunk to the staging sink, verifying the full length landed
///
/// A partial write would silently corrupt the artifact, so it aborts the
/// attempt with [`DownloadError::ShortWrite`] instead of continuing.
async fn append_chunk<W>(sink: &mut W, chunk: &[u8]) -> Result<usize>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let written = sink.write(chunk).await?;
    if written != chunk.len() {
        return Err(DownloadError::ShortWrite {
            expected: chunk.len(),
            written,
        }
        .into());
    }
    Ok(written)
}

/// Byte length of the staging artifact, or 0 if none exists
async fn staging_len(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Total transfer length for this attempt
///
/// `Content-Range: bytes start-end/total` wins when present; otherwise
/// `Content-Length` plus the resume offset; otherwise unknown (unbounded).
fn total_length(response: &reqwest::Response, offset: u64) -> Option<u64> {
    if let Some(total) = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(content_range_total)
    {
        return Some(total);
    }

    response.content_length().map(|len| len + offset)
}

/// Parse the total out of a `Content-Range` header value
///
/// Returns None for the unknown-total form (`bytes 0-499/*`).
fn content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let total = rest.split('/').nth(1)?.trim();
    total.parse().ok()
}
