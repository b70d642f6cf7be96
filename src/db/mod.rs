//! Database layer for httpdl
//!
//! Handles SQLite persistence for job records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`jobs`] — Job record CRUD and the [`JobStore`](crate::store::JobStore) impl

use sqlx::{sqlite::SqlitePool, FromRow};

mod jobs;
mod migrations;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

/// Job record as stored in the `jobs` table
///
/// Raw row shape; convert to [`crate::types::Job`] with [`JobRow::into_job`].
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Unique database ID
    pub id: i64,
    /// Target artifact name (staging/final file key)
    pub filename: String,
    /// Fetch location
    pub url: String,
    /// Current status (0=pending, 1=queued, 2=downloading, 3=completed, 4=failed)
    pub status: i32,
    /// Progress percent 0-100
    pub progress: i32,
    /// Total byte size once learned from a response
    pub content_length: Option<i64>,
    /// Unix timestamp when the record was created
    pub created_at: i64,
    /// Unix timestamp when the record was last mutated
    pub updated_at: i64,
}

impl JobRow {
    /// Convert the raw row into the domain [`Job`](crate::types::Job) type
    pub fn into_job(self) -> crate::types::Job {
        crate::types::Job {
            id: crate::types::JobId(self.id),
            filename: self.filename,
            url: self.url,
            status: crate::types::JobStatus::from_i32(self.status),
            progress: self.progress,
            content_length: self.content_length,
            created_at: chrono::DateTime::from_timestamp(self.created_at, 0)
                .unwrap_or_else(chrono::Utc::now),
            updated_at: chrono::DateTime::from_timestamp(self.updated_at, 0)
                .unwrap_or_else(chrono::Utc::now),
        }
    }
}

/// SQLite-backed job store
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}
