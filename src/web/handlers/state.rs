//! Shared application state for API handlers.

use std::sync::Arc;

use crate::storage::{ConflictPolicy, StorageEngine};
use crate::web::error::ApiError;

/// Default upload limit when none is configured (100MB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Application state shared by all handlers.
pub struct AppState {
    /// The storage engine.
    pub engine: Arc<StorageEngine>,
    /// Conflict policy for uploads that do not specify one.
    pub on_conflict: ConflictPolicy,
    /// Maximum upload size in bytes.
    pub max_upload_size: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self {
            engine,
            on_conflict: ConflictPolicy::default(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }

    /// Set the default conflict policy for uploads.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = policy;
        self
    }

    /// Set the maximum upload size in bytes.
    pub fn with_max_upload_size(mut self, max_upload_size: u64) -> Self {
        self.max_upload_size = max_upload_size;
        self
    }

    /// Run a blocking engine operation off the async executor.
    pub async fn run<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&StorageEngine) -> crate::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || op(&engine))
            .await
            .map_err(|e| {
                tracing::error!("Storage task failed: {}", e);
                ApiError::internal("Storage task failed")
            })?
            .map_err(ApiError::from)
    }
}
