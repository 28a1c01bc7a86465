//! API key authentication middleware.

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::web::error::ApiError;

/// Alternative header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Accepted API keys, kept only as SHA-256 digests.
#[derive(Clone, Default)]
pub struct ApiKeyState {
    digests: Vec<[u8; 32]>,
}

impl ApiKeyState {
    /// Create the state from the configured keys.
    pub fn new(keys: &[String]) -> Self {
        Self {
            digests: keys.iter().map(|k| digest(k)).collect(),
        }
    }

    /// Whether any key is configured. Without keys every request passes.
    pub fn is_enabled(&self) -> bool {
        !self.digests.is_empty()
    }

    /// Check a presented key against every configured key.
    ///
    /// Digests have a fixed length and are compared without early exit, so
    /// timing reveals neither the key length nor a matching prefix.
    pub fn verify(&self, presented: &str) -> bool {
        let presented = digest(presented);
        self.digests
            .iter()
            .fold(false, |found, known| found | digests_equal(known, &presented))
    }
}

fn digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

fn digests_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extract the key from `Authorization: Bearer …` or `X-Api-Key`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        return Some(bearer.trim());
    }

    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

/// Middleware rejecting requests without a valid API key.
pub async fn api_key_auth(
    state: Arc<ApiKeyState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.is_enabled() {
        return next.run(request).await;
    }

    match presented_key(request.headers()).map(|key| state.verify(key)) {
        Some(true) => next.run(request).await,
        Some(false) => {
            tracing::debug!(uri = %request.uri(), "Rejected invalid API key");
            ApiError::unauthorized("Invalid API key").into_response()
        }
        None => ApiError::unauthorized("Missing API key").into_response(),
    }
}
