//! HTTP API for fsbucket.
//!
//! Thin glue over the [`crate::storage::StorageEngine`]: routing, API key
//! authentication, rate limiting, and mapping of storage errors to status
//! codes.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
