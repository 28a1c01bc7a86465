//! fsbucket - S3-like object storage backed by a plain directory tree.
//!
//! The [`storage`] module is the core: it sandboxes untrusted relative paths
//! inside a single root and serializes every mutation. The [`web`] module
//! exposes it over HTTP.

pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod web;

pub use config::Config;
pub use error::{BucketError, Result};
pub use storage::{
    ConflictPolicy, DirectoryEntry, FileEntry, Listing, RelativePath, StorageEngine, StorageRoot,
};
