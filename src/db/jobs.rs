//! Job record CRUD operations.

use crate::error::DatabaseError;
use crate::store::JobStore;
use crate::types::{Job, JobId, JobStatus, NewJob};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, JobRow};

impl Database {
    /// Insert a new job record with `status=pending, progress=0`
    pub async fn insert_job(&self, new_job: &NewJob) -> Result<JobId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (filename, url, status, progress, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_job.filename)
        .bind(&new_job.url)
        .bind(JobStatus::Pending.to_i32())
        .bind(0i32)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert job: {}",
                e
            )))
        })?;

        Ok(JobId(result.last_insert_rowid()))
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, filename, url, status, progress, content_length,
                   created_at, updated_at
            FROM jobs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get job: {}",
                e
            )))
        })?;

        Ok(row.map(JobRow::into_job))
    }

    /// List all jobs, oldest first
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, filename, url, status, progress, content_length,
                   created_at, updated_at
            FROM jobs
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list jobs: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    /// Set a job's status and progress in one write
    pub async fn update_job_status(
        &self,
        id: JobId,
        status: JobStatus,
        progress: i32,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, progress = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.to_i32())
        .bind(progress)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update job status: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "job {} not found",
                id
            ))));
        }

        Ok(())
    }

    /// Record the total byte length learned from a transfer response
    pub async fn set_job_content_length(&self, id: JobId, content_length: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET content_length = ?, updated_at = ? WHERE id = ?",
        )
        .bind(content_length)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set content length: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "job {} not found",
                id
            ))));
        }

        Ok(())
    }
}

#[async_trait]
impl JobStore for Database {
    async fn create(&self, new_job: NewJob) -> Result<JobId> {
        self.insert_job(&new_job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        self.get_job(id).await
    }

    async fn update_status(&self, id: JobId, status: JobStatus, progress: i32) -> Result<()> {
        self.update_job_status(id, status, progress).await
    }

    async fn set_content_length(&self, id: JobId, content_length: i64) -> Result<()> {
        self.set_job_content_length(id, content_length).await
    }

    async fn list(&self) -> Result<Vec<Job>> {
        self.list_jobs().await
    }
}
