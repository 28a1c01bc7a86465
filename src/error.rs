//! Error types for fsbucket.

use thiserror::Error;

/// Common error type for fsbucket.
///
/// The first six variants are the storage engine's failure taxonomy. Anything
/// the engine cannot classify surfaces as [`BucketError::Io`].
#[derive(Error, Debug)]
pub enum BucketError {
    /// Path fails normalization or resolves outside the sandbox root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A path component is a symlink while the policy disallows symlinks.
    #[error("symlink rejected: {0}")]
    SymlinkRejected(String),

    /// A bare name is empty or contains a separator, a null byte, `.` or `..`.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Destination of a create or rename is already occupied.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Delete or rename attempted on the sandbox root.
    #[error("operation not permitted on the storage root")]
    RootOperationForbidden,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for fsbucket operations.
pub type Result<T> = std::result::Result<T, BucketError>;
