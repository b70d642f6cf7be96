//! # httpdl
//!
//! Embeddable manager for long-running, resumable HTTP(S) downloads,
//! queued and retried as batched jobs.
//!
//! ## Design Philosophy
//!
//! httpdl is designed to be:
//! - **Resumable** - Transfers continue from the staging artifact's offset
//! - **Idempotent** - A promoted final artifact is the source of truth;
//!   redelivered work is skipped without touching the network
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Broker-agnostic** - Job store and retry queue are trait seams with
//!   SQLite and in-memory defaults
//!
//! ## Quick Start
//!
//! ```no_run
//! use httpdl::{Config, DownloadManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = DownloadManager::new(Config::default()).await?;
//!
//!     let id = manager.submit("a.bin", "https://example.com/a.bin").await?;
//!     manager.enqueue(&[id]).await?;
//!     manager.start().await;
//!
//!     // ... poll manager.progress() or serve the REST API ...
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Batch dispatcher (consume, fan out, join, settle)
pub mod dispatcher;
/// Download engine (resumable transfer of one job)
pub mod engine;
/// Error types
pub mod error;
/// Owning facade over store, queue, engine, and dispatcher
pub mod manager;
/// Retry queue abstraction and in-memory broker
pub mod queue;
/// Job store abstraction and in-memory implementation
pub mod store;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{BatchConfig, Config, TransferConfig};
pub use db::Database;
pub use dispatcher::BatchDispatcher;
pub use engine::{AttemptOutcome, DownloadEngine, ProgressReporter};
pub use error::{DatabaseError, DownloadError, Error, Result};
pub use manager::DownloadManager;
pub use queue::{Delivery, MemoryQueue, RetryQueue};
pub use store::{JobStore, MemoryJobStore};
pub use types::{
    BatchOutcome, Job, JobId, JobProgress, JobStatus, NewJob, ProgressSnapshot, RetryEnvelope,
};

/// Helper function to run the manager with graceful signal handling.
///
/// Waits for a termination signal and then calls the manager's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use httpdl::{Config, DownloadManager, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = DownloadManager::new(Config::default()).await?;
///     manager.start().await;
///
///     run_with_shutdown(manager).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: DownloadManager) -> Result<()> {
    wait_for_signal().await;
    manager.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
