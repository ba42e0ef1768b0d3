//! Error types for the pipeline core.
//!
//! Uses `thiserror` for the public error types shared by the step crates and the CLI.

use std::path::PathBuf;

/// Top-level error type for the core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {message}")]
    Logging { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration file already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("Configuration render error: {0}")]
    Render(#[from] toml::ser::Error),
}

/// A type alias for results using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = CoreError::Config(ConfigError::FileNotFound {
            path: PathBuf::from("/tmp/missing.toml"),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Configuration file not found: /tmp/missing.toml"
        );
    }

    #[test]
    fn test_error_display_invalid() {
        let err = ConfigError::Invalid {
            message: "validation.alpha must be in (0, 1)".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: validation.alpha must be in (0, 1)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CoreError = io_err.into();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
