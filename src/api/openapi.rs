//! OpenAPI documentation for the REST API

use utoipa::OpenApi;

/// OpenAPI documentation root
#[derive(OpenApi)]
#[openapi(
    info(
        title = "httpdl API",
        description = "Resumable HTTP download manager with batched retry",
        license(name = "MIT OR Apache-2.0")
    ),
    paths(
        crate::api::routes::submit_job,
        crate::api::routes::enqueue_jobs,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::get_progress,
    ),
    components(schemas(
        crate::api::routes::SubmitJobRequest,
        crate::api::routes::SubmitJobResponse,
        crate::api::routes::EnqueueRequest,
        crate::types::Job,
        crate::types::JobId,
        crate::types::JobStatus,
        crate::types::JobProgress,
        crate::types::ProgressSnapshot,
    )),
    tags(
        (name = "jobs", description = "Job submission and inspection"),
        (name = "progress", description = "Progress polling")
    )
)]
pub struct ApiDoc;
