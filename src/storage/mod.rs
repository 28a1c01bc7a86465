//! Storage engine for fsbucket.
//!
//! This module owns everything that touches the bucket's directory tree:
//! - Normalization of untrusted relative paths and bare names
//! - Sandboxing of every resolved path inside the storage root
//! - Optional rejection of symbolic links along a path
//! - Serialized folder/file mutations and lock-free listings

mod engine;
mod entry;
mod path;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use engine::StorageEngine;
pub use entry::{DirectoryEntry, FileEntry, Listing};
pub use path::{basename, sanitize_name, RelativePath, STAGING_PREFIX};

/// The sandbox every storage operation is confined to.
///
/// Built once at startup from [`crate::config::StorageConfig::open_root`] and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    path: PathBuf,
    follow_symlinks: bool,
}

impl StorageRoot {
    /// Create a root from an already canonical absolute directory.
    pub fn new(path: impl Into<PathBuf>, follow_symlinks: bool) -> Self {
        Self {
            path: path.into(),
            follow_symlinks,
        }
    }

    /// Canonical absolute path of the root directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether symbolic links inside the root may be traversed.
    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }
}

/// What an upload does when a file with the same name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Replace the existing file (last write wins).
    #[default]
    Overwrite,
    /// Fail with `AlreadyExists`.
    Reject,
    /// Store under the first free `name-N.ext`.
    Version,
}
