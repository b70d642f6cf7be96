//! Error types for httpdl
//!
//! This module provides the error taxonomy for the library:
//! - Domain-specific error types (Download, Database, Queue)
//! - Transfer-failure classification used by the batch retry machinery
//! - Context information (job id, filename, attempt counts)

use thiserror::Error;

/// Result type alias for httpdl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for httpdl
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Retry queue broker failure (publish, consume, or settlement)
    #[error("queue error: {0}")]
    Queue(String),

    /// At least one job in a dispatched batch failed
    #[error("batch failed: {failed} of {total} jobs")]
    Batch {
        /// Number of jobs that failed in the cycle
        failed: usize,
        /// Number of jobs launched in the cycle
        total: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Job not found
    #[error("job not found: {0}")]
    NotFound(String),

    /// Invalid source URL supplied at submission
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Transfer-failure classification
///
/// Every variant marks the affected job `failed`; only `Transport` is retried
/// inline by the engine (up to its attempt ceiling) before surfacing.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection/TLS/DNS failure before a response was obtained, after
    /// exhausting the inline transport retry ceiling
    #[error("transport failure after {attempts} attempts: {message}")]
    Transport {
        /// Total attempts made, including the first
        attempts: u32,
        /// Last transport error observed
        message: String,
    },

    /// Server ignored a Range request on a resumed attempt
    #[error("resume not supported: expected 206 partial content, got {status}")]
    ResumeUnsupported {
        /// HTTP status the server answered with
        status: u16,
    },

    /// Server answered with a status outside 200/206
    #[error("unexpected HTTP status {status}")]
    HttpStatus {
        /// HTTP status the server answered with
        status: u16,
    },

    /// Stream ended before reaching the expected total length
    #[error("incomplete transfer: got {received} of {expected} bytes")]
    IncompleteTransfer {
        /// Total byte length the attempt expected
        expected: u64,
        /// Cumulative bytes present in staging when the stream ended
        received: u64,
    },

    /// Mid-transfer read or protocol fault
    #[error("stream error: {0}")]
    Stream(String),

    /// The sink accepted fewer bytes than the chunk carried
    #[error("short write: wrote {written} of {expected} bytes")]
    ShortWrite {
        /// Chunk length handed to the sink
        expected: usize,
        /// Bytes the sink actually accepted
        written: usize,
    },

    /// Failed to promote the staging artifact to its final location
    #[error("promotion failed: {0}")]
    Promotion(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// A query failed to execute
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),
}
