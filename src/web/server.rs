//! Web server for fsbucket.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::ServerConfig;
use crate::storage::{ConflictPolicy, StorageEngine};
use crate::{BucketError, Result};

use super::handlers::AppState;
use super::middleware::RateLimitState;
use super::router::{create_health_router, create_router};

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Per-client rate limiter.
    rate_limit: Arc<RateLimitState>,
    /// Server configuration.
    config: ServerConfig,
}

impl WebServer {
    /// Create a new web server around an opened storage engine.
    pub fn new(
        config: &ServerConfig,
        engine: Arc<StorageEngine>,
        on_conflict: ConflictPolicy,
    ) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| BucketError::Config(format!("invalid server address: {e}")))?;

        let app_state = AppState::new(engine)
            .with_conflict_policy(on_conflict)
            .with_max_upload_size(config.max_upload_size_bytes());

        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
            rate_limit: Arc::new(
                RateLimitState::new(config.api_rate_limit)
                    .with_trusted_proxy_headers(config.trust_proxy_headers),
            ),
            config: config.clone(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn into_router(self) -> Router {
        if self.config.api_keys.is_empty() {
            tracing::warn!("No API keys configured, the API is open to every client");
        }

        Arc::clone(&self.rate_limit).start_cleanup_task();

        create_router(self.app_state, self.rate_limit, &self.config)
            .merge(create_health_router())
            .layer(CompressionLayer::new())
    }

    /// Run the web server.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.into_router();

        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::result::Result<SocketAddr, std::io::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.into_router();

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageRoot;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn create_test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Use random port
            ..Default::default()
        }
    }

    fn create_engine(temp: &TempDir) -> Arc<StorageEngine> {
        let root = StorageRoot::new(temp.path().canonicalize().unwrap(), false);
        Arc::new(StorageEngine::new(root))
    }

    #[test]
    fn test_web_server_new() {
        let temp = TempDir::new().unwrap();
        let server = WebServer::new(
            &create_test_config(),
            create_engine(&temp),
            ConflictPolicy::Overwrite,
        )
        .unwrap();

        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn test_web_server_invalid_host() {
        let temp = TempDir::new().unwrap();
        let config = ServerConfig {
            host: "not a host".to_string(),
            ..create_test_config()
        };

        let result = WebServer::new(&config, create_engine(&temp), ConflictPolicy::Overwrite);
        assert!(matches!(result, Err(BucketError::Config(_))));
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let temp = TempDir::new().unwrap();
        let server = WebServer::new(
            &create_test_config(),
            create_engine(&temp),
            ConflictPolicy::Overwrite,
        )
        .unwrap();
        let addr = server.run_with_addr().await.unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));
    }
}
