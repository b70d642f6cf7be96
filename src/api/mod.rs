//! REST API server module
//!
//! Thin HTTP surface over [`DownloadManager`]: the job-submission,
//! bulk-enqueue, and progress-polling collaborators. OpenAPI 3.1 documented,
//! optionally served with Swagger UI.

use crate::{DownloadManager, Error, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod openapi;
pub mod routes;
pub mod state;


pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// - `POST /api/v1/jobs` - Submit a job (filename + source URL)
/// - `POST /api/v1/jobs/enqueue` - Enqueue jobs as one retry envelope
/// - `GET /api/v1/jobs` - List all jobs
/// - `GET /api/v1/jobs/:id` - Get a single job
/// - `GET /api/v1/progress` - Progress snapshot plus polling hint
pub fn create_router(state: AppState, enable_swagger: bool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/api/v1/jobs", post(routes::submit_job).get(routes::list_jobs))
        .route("/api/v1/jobs/enqueue", post(routes::enqueue_jobs))
        .route("/api/v1/jobs/:id", get(routes::get_job))
        .route("/api/v1/progress", get(routes::get_progress));

    if enable_swagger {
        router = router
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until the process is stopped
///
/// Binds `addr` and serves the router over the given manager.
pub async fn serve(manager: Arc<DownloadManager>, addr: SocketAddr) -> Result<()> {
    let enable_swagger = manager.config.enable_swagger;
    let router = create_router(AppState::new(manager), enable_swagger);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ApiServerError(format!("failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "API server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| Error::ApiServerError(e.to_string()))
}
