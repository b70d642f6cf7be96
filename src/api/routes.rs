//! Job submission, enqueue, and progress-polling handlers.

use crate::api::AppState;
use crate::error::Error;
use crate::types::JobId;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Request body for job submission
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SubmitJobRequest {
    /// Target artifact name (must be unique across live jobs)
    pub filename: String,
    /// Source URL to fetch
    pub url: String,
}

/// Response body for job submission
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SubmitJobResponse {
    /// Identifier of the created job
    pub id: JobId,
}

/// Request body for bulk enqueue
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct EnqueueRequest {
    /// Job ids to enqueue as one envelope
    pub ids: Vec<JobId>,
}

/// Map a library error onto an HTTP error response
fn error_response(e: Error) -> Response {
    let status = match &e {
        Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

/// POST /jobs - Submit a new download job
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 201, description = "Job created", body = SubmitJobResponse),
        (status = 400, description = "Invalid source URL"),
        (status = 503, description = "Shutting down")
    )
)]
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Response {
    match state
        .manager
        .submit(&request.filename, &request.url)
        .await
    {
        Ok(id) => (StatusCode::CREATED, Json(SubmitJobResponse { id })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "job submission failed");
            error_response(e)
        }
    }
}

/// POST /jobs/enqueue - Enqueue jobs for download as one envelope
#[utoipa::path(
    post,
    path = "/api/v1/jobs/enqueue",
    tag = "jobs",
    request_body = EnqueueRequest,
    responses(
        (status = 202, description = "Jobs queued"),
        (status = 404, description = "A referenced job does not exist"),
        (status = 503, description = "Shutting down")
    )
)]
pub async fn enqueue_jobs(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Response {
    match state.manager.enqueue(&request.ids).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "queued": request.ids }))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "enqueue failed");
            error_response(e)
        }
    }
}

/// GET /jobs - List all jobs
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "List of all jobs", body = Vec<crate::types::Job>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> Response {
    match state.manager.list_jobs().await {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list jobs");
            error_response(e)
        }
    }
}

/// GET /jobs/:id - Get a single job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job record", body = crate::types::Job),
        (status = 404, description = "Job not found")
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.manager.get_job(JobId(id)).await {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => error_response(Error::NotFound(format!("job {}", id))),
        Err(e) => {
            tracing::error!(error = %e, job_id = id, "failed to get job");
            error_response(e)
        }
    }
}

/// GET /progress - Progress snapshot for all jobs
#[utoipa::path(
    get,
    path = "/api/v1/progress",
    tag = "progress",
    responses(
        (status = 200, description = "Per-job progress plus the polling hint",
         body = crate::types::ProgressSnapshot),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_progress(State(state): State<AppState>) -> Response {
    match state.manager.progress().await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to build progress snapshot");
            error_response(e)
        }
    }
}
