//! Folder and file metadata returned by the storage engine.

use std::fs::Metadata;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::path::RelativePath;

/// A folder inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// Folder name.
    pub name: String,
    /// Location relative to the storage root.
    pub path: RelativePath,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

impl DirectoryEntry {
    pub(crate) fn new(path: RelativePath, metadata: &Metadata) -> Self {
        Self {
            name: path.name().unwrap_or_default().to_string(),
            modified_at: modified_at(metadata),
            path,
        }
    }
}

/// A file inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// File name.
    pub name: String,
    /// Location relative to the storage root.
    pub path: RelativePath,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl FileEntry {
    pub(crate) fn new(path: RelativePath, metadata: &Metadata) -> Self {
        Self {
            name: path.name().unwrap_or_default().to_string(),
            modified_at: modified_at(metadata),
            size_bytes: metadata.len(),
            path,
        }
    }
}

/// Immediate children of one folder, each group sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    /// The listed folder.
    pub path: RelativePath,
    /// Sub-folders.
    pub directories: Vec<DirectoryEntry>,
    /// Files.
    pub files: Vec<FileEntry>,
}

/// Modification time as UTC. Platforms without mtime report the epoch.
fn modified_at(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .into()
}
