//! Request DTOs for the HTTP API.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::storage::ConflictPolicy;

/// `?path=` query used by listing and folder deletion.
#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    /// Relative path; empty means the root.
    #[serde(default)]
    pub path: String,
}

/// Create folder request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFolderRequest {
    /// Parent folder; created if missing.
    #[serde(default)]
    pub parent: String,
    /// New folder name.
    #[validate(length(max = 255, message = "Name must be at most 255 characters"))]
    pub name: String,
}

/// Rename folder request.
#[derive(Debug, Deserialize, Validate)]
pub struct RenameFolderRequest {
    /// Folder to rename.
    pub path: String,
    /// New name within the same parent.
    #[validate(length(max = 255, message = "Name must be at most 255 characters"))]
    pub new_name: String,
}

/// Query parameters for file upload.
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    /// Destination folder; created if missing.
    #[serde(default)]
    pub path: String,
    /// Overrides the configured conflict policy for this upload.
    #[serde(default)]
    pub on_conflict: Option<ConflictPolicy>,
}

/// `?path=&filename=` query used by file deletion and public path composition.
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    /// Folder containing the file.
    #[serde(default)]
    pub path: String,
    /// File name.
    pub filename: String,
}

/// Prune request. Exactly one of `older_than` and `max_age_secs` must be set.
#[derive(Debug, Deserialize)]
pub struct PruneRequest {
    /// Folder to prune recursively.
    #[serde(default)]
    pub path: String,
    /// Absolute threshold (RFC 3339).
    #[serde(default)]
    pub older_than: Option<DateTime<Utc>>,
    /// Threshold relative to `now`, in seconds.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl PruneRequest {
    /// Resolve the threshold, or `None` if the request is ambiguous.
    pub fn threshold(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match (self.older_than, self.max_age_secs) {
            (Some(at), None) => Some(at),
            (None, Some(secs)) => {
                let secs = i64::try_from(secs).ok()?;
                now.checked_sub_signed(Duration::try_seconds(secs)?)
            }
            _ => None,
        }
    }
}
