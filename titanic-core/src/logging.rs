//! Tracing setup: human-readable stderr plus structured JSON log files.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::CoreError;

/// Log file name prefix; the appender adds the date suffix.
pub const LOG_FILE_NAME: &str = "titanic.log";

/// Map CLI verbosity flags to a filter directive.
pub fn filter_for(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Platform data directory for log files, falling back to `./logs`.
pub fn default_log_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "titanic", "titanic")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the verbosity flags for the stderr layer. The
/// returned guard flushes the JSON file writer and must be held until exit.
pub fn init_tracing(
    verbose: u8,
    quiet: bool,
    logging: &LoggingConfig,
) -> Result<Option<WorkerGuard>, CoreError> {
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for(verbose, quiet)));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    if logging.disable_file_log {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .try_init()
            .map_err(|e| CoreError::Logging {
                message: e.to_string(),
            })?;
        return Ok(None);
    }

    let log_dir = logging.log_dir.clone().unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| CoreError::Logging {
            message: e.to_string(),
        })?;

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_for_levels() {
        assert_eq!(filter_for(0, true), "error");
        assert_eq!(filter_for(0, false), "info");
        assert_eq!(filter_for(1, false), "debug");
        assert_eq!(filter_for(3, true), "trace");
    }

    #[test]
    fn test_default_log_dir_ends_in_logs() {
        assert!(default_log_dir().ends_with("logs"));
    }
}
