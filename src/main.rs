use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use fsbucket::web::WebServer;
use fsbucket::{Config, StorageEngine};

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = fsbucket::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        fsbucket::logging::init_console_only(&config.logging.level);
    }

    info!("fsbucket {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let root = match config.storage.open_root() {
        Ok(root) => root,
        Err(e) => {
            error!("Failed to open storage root {}: {}", config.storage.root, e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        root = %root.path().display(),
        follow_symlinks = root.follow_symlinks(),
        "Storage root opened"
    );

    let engine = Arc::new(StorageEngine::new(root));
    let server = match WebServer::new(&config.server, engine, config.storage.on_conflict) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to configure web server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
