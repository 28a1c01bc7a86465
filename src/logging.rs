//! Tracing setup for fsbucket.
//!
//! Console output is always on. The log file, when configured, receives the
//! same events without ANSI colors and is appended to across restarts.
//! `FSBUCKET_LOG` takes a full `EnvFilter` directive and overrides the
//! configured level, e.g. `FSBUCKET_LOG=fsbucket::storage=debug,info`.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::Result;

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "FSBUCKET_LOG";

/// Normalize a configured level. Unknown values fall back to `info`.
fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level_directive(level)))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Install the global subscriber: console plus the configured log file.
///
/// An empty `file` means console only. Fails if the log file cannot be
/// opened; nothing is installed in that case.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if config.file.trim().is_empty() {
        init_console_only(&config.level);
        return Ok(());
    }

    let path = Path::new(&config.file);
    let log_file = Arc::new(open_log_file(path)?);

    tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_writer(log_file).with_ansi(false))
        .init();

    tracing::info!(file = %path.display(), "Logging to file");
    Ok(())
}

/// Install a console-only subscriber.
pub fn init_console_only(level: &str) {
    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive(" warning "), "warn");
        assert_eq!(level_directive("error"), "error");
        assert_eq!(level_directive("trace"), "trace");
        assert_eq!(level_directive("verbose"), "info");
        assert_eq!(level_directive(""), "info");
    }

    #[test]
    fn test_open_log_file_appends() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/fsbucket.log");

        open_log_file(&path).unwrap().write_all(b"first\n").unwrap();
        open_log_file(&path).unwrap().write_all(b"second\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_init_rejects_unwritable_log_path() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        // A regular file stands where the log directory should be.
        let config = LoggingConfig {
            level: "info".to_string(),
            file: blocker.join("app.log").to_string_lossy().into_owned(),
        };
        assert!(init(&config).is_err());
    }
}
