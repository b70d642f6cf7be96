//! Configuration types for httpdl

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use utoipa::ToSchema;

/// Transfer behavior configuration (timeouts, retries, progress granularity)
///
/// Groups settings that govern a single job's HTTP transfer.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferConfig {
    /// Connection establishment / TLS handshake timeout in seconds (default: 120)
    ///
    /// There is deliberately no deadline on total transfer duration or on
    /// individual chunk reads.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Total attempts per engine call when the request itself fails at the
    /// transport level (default: 5). Retries are immediate, with no backoff,
    /// and reuse the staging file's resume offset.
    #[serde(default = "default_transport_attempts")]
    pub transport_attempts: u32,

    /// Minimum percent delta between persisted progress updates (default: 5)
    ///
    /// Bounds write amplification on the job store during a transfer.
    #[serde(default = "default_progress_step")]
    pub progress_step: i32,

    /// User-Agent header sent with transfer requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl TransferConfig {
    /// Connection timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            transport_attempts: default_transport_attempts(),
            progress_step: default_progress_step(),
            user_agent: default_user_agent(),
        }
    }
}

/// Batch dispatch configuration (batch size, retry ceiling, idle polling)
///
/// Groups settings that govern the dispatcher's consume/fan-out/requeue cycle.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchConfig {
    /// Maximum envelopes consumed per dispatch cycle (default: 5)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Envelope-level retry ceiling stamped on newly published envelopes (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long the dispatch loop sleeps when the queue is empty, in
    /// milliseconds (default: 500)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl BatchConfig {
    /// Idle poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Top-level configuration for [`DownloadManager`](crate::DownloadManager)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Directory holding in-progress staging artifacts (default: "./var/staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Directory holding promoted final artifacts (default: "./var/final")
    ///
    /// Presence of a file here is the sole source of truth for idempotent
    /// completion.
    #[serde(default = "default_final_dir")]
    pub final_dir: PathBuf,

    /// Path to the SQLite job store (default: "./var/httpdl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Transfer behavior settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Batch dispatch settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Bind address for the REST API (None = API disabled)
    #[serde(default)]
    pub api_bind: Option<SocketAddr>,

    /// Serve Swagger UI at /swagger-ui when the API is enabled (default: true)
    #[serde(default = "default_true")]
    pub enable_swagger: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            final_dir: default_final_dir(),
            database_path: default_database_path(),
            transfer: TransferConfig::default(),
            batch: BatchConfig::default(),
            api_bind: None,
            enable_swagger: default_true(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    120
}

fn default_transport_attempts() -> u32 {
    5
}

fn default_progress_step() -> i32 {
    5
}

fn default_user_agent() -> String {
    format!("httpdl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_batch_size() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./var/staging")
}

fn default_final_dir() -> PathBuf {
    PathBuf::from("./var/final")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./var/httpdl.db")
}

fn default_true() -> bool {
    true
}
