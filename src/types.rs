//! Core types for httpdl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a download job
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<JobId> for i64 {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for JobId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Job lifecycle status
///
/// Transitions: `Pending → Queued → Downloading → {Completed | Failed}`.
/// The dispatcher may move `Failed → Queued` while the batch retry ceiling
/// has not been reached; `Completed` and post-ceiling `Failed` are absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created by submission, not yet enqueued
    Pending,
    /// Enqueued for work, progress reset to 0
    Queued,
    /// An attempt is in flight
    Downloading,
    /// Final artifact promoted (terminal)
    Completed,
    /// Last attempt failed; terminal once the batch retry ceiling is exhausted
    Failed,
}

impl JobStatus {
    /// Convert integer status code to JobStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => JobStatus::Pending,
            1 => JobStatus::Queued,
            2 => JobStatus::Downloading,
            3 => JobStatus::Completed,
            4 => JobStatus::Failed,
            _ => JobStatus::Failed,
        }
    }

    /// Convert JobStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Queued => 1,
            JobStatus::Downloading => 2,
            JobStatus::Completed => 3,
            JobStatus::Failed => 4,
        }
    }

    /// True for states the progress-polling interface should keep polling on
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Downloading)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One download unit and its persisted state
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Job {
    /// Store-assigned unique identifier
    pub id: JobId,
    /// Target artifact name; keys the staging and final paths.
    /// Must be unique per live job (caller invariant).
    pub filename: String,
    /// Fetch location
    pub url: String,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Integer percent 0-100; meaningful only while downloading
    pub progress: i32,
    /// Total byte size, learned from the first successful response of an attempt
    pub content_length: Option<i64>,
    /// When the job record was created
    pub created_at: DateTime<Utc>,
    /// When the job record was last mutated
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a new job record
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct NewJob {
    /// Target artifact name
    pub filename: String,
    /// Fetch location
    pub url: String,
}

/// A queued unit of work referencing one or more job ids plus retry bookkeeping.
///
/// Wire schema: `{ "jobIDs": [..], "retryCount": n, "maxRetries": n }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RetryEnvelope {
    /// Ordered set of job ids to (re)attempt
    #[serde(rename = "jobIDs")]
    pub job_ids: Vec<JobId>,
    /// Attempts already made at the envelope level (starts at 0)
    #[serde(rename = "retryCount")]
    pub retry_count: u32,
    /// Ceiling for envelope-level retries
    #[serde(rename = "maxRetries")]
    pub max_retries: u32,
}

impl RetryEnvelope {
    /// Create a fresh envelope with zero retries consumed
    pub fn new(job_ids: Vec<JobId>, max_retries: u32) -> Self {
        Self {
            job_ids,
            retry_count: 0,
            max_retries,
        }
    }

    /// Derive the follow-up envelope for a failed subset of this envelope's jobs
    pub fn next_attempt(&self, failed_ids: Vec<JobId>) -> Self {
        Self {
            job_ids: failed_ids,
            retry_count: self.retry_count + 1,
            max_retries: self.max_retries,
        }
    }

    /// True if another envelope-level retry is still permitted
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Per-cycle dispatch result (transient, never persisted)
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
    /// Job ids whose attempt completed in this cycle
    pub completed: Vec<JobId>,
    /// Job ids whose attempt failed in this cycle
    pub failed: Vec<JobId>,
    /// Last error observed across the batch, if any
    pub last_error: Option<String>,
}

impl BatchOutcome {
    /// True when every launched attempt in the cycle succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Progress view of a single job, as returned by the polling interface
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobProgress {
    /// Job identifier
    pub id: JobId,
    /// Target artifact name
    pub filename: String,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Integer percent 0-100
    pub progress: i32,
}

impl From<&Job> for JobProgress {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            filename: job.filename.clone(),
            status: job.status,
            progress: job.progress,
        }
    }
}

/// Snapshot returned by the progress-polling interface
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressSnapshot {
    /// Per-job progress views
    pub jobs: Vec<JobProgress>,
    /// True while any job is queued or downloading
    pub should_poll: bool,
}
