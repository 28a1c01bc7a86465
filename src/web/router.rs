//! Router configuration for the HTTP API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

use super::handlers::{
    create_folder, delete_file, delete_folder, download_file, list_folder, prune,
    public_download, public_path, rename_folder, upload_file, AppState,
};
use super::middleware::{
    api_key_auth, api_rate_limit, create_cors_layer, security_headers, ApiKeyState,
    RateLimitState,
};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the main API router.
pub fn create_router(
    app_state: Arc<AppState>,
    rate_limit: Arc<RateLimitState>,
    config: &ServerConfig,
) -> Router {
    let body_limit = usize::try_from(config.max_upload_size_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let folder_routes = Router::new()
        .route("/list", get(list_folder))
        .route("/folders", post(create_folder).delete(delete_folder))
        .route("/folders/rename", post(rename_folder));

    let file_routes = Router::new()
        .route("/files", post(upload_file).delete(delete_file))
        .route("/prune", post(prune))
        .route("/public-path", get(public_path))
        .route("/download/*path", get(download_file))
        .layer(DefaultBodyLimit::max(body_limit));

    let api_key_state = Arc::new(ApiKeyState::new(&config.api_keys));

    let api_routes = Router::new()
        .merge(folder_routes)
        .merge(file_routes)
        .layer(middleware::from_fn(move |req, next| {
            let state = api_key_state.clone();
            api_key_auth(state, req, next)
        }));

    let mut router = Router::new().nest("/api", api_routes);

    // Public downloads skip the API key check.
    if config.public_downloads {
        router = router.route("/public/*path", get(public_download));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&config.cors_origins))
                .layer(middleware::from_fn(security_headers))
                .layer(middleware::from_fn(move |req, next| {
                    let state = rate_limit.clone();
                    api_rate_limit(state, req, next)
                })),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
