//! Application state for the API server

use crate::DownloadManager;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the download manager.
#[derive(Clone)]
pub struct AppState {
    /// The main DownloadManager instance
    pub manager: Arc<DownloadManager>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(manager: Arc<DownloadManager>) -> Self {
        Self { manager }
    }
}
