//! Response DTOs for the HTTP API.
//!
//! Listings and entries are serialized straight from the storage types; the
//! wrappers here only cover the operations that return paths.

use serde::Serialize;

use crate::storage::RelativePath;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Result of a folder or file deletion.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    /// Relative path that was removed.
    pub deleted_path: RelativePath,
}

/// Result of a prune.
#[derive(Debug, Serialize)]
pub struct PruneResponse {
    /// Relative paths of every removed file.
    pub deleted_paths: Vec<RelativePath>,
}

/// Shareable locator of a file.
#[derive(Debug, Serialize)]
pub struct PublicPathResponse {
    /// Canonical relative path.
    pub public_path: String,
    /// Percent-encoded URL path under `/public/`.
    pub url: String,
}

impl PublicPathResponse {
    /// Build the response for a composed public path.
    pub fn new(public_path: String) -> Self {
        let encoded: Vec<_> = public_path
            .split('/')
            .map(urlencoding::encode)
            .collect();
        let url = format!("/public/{}", encoded.join("/"));
        Self { public_path, url }
    }
}
