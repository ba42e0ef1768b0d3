//! Error types for the pipeline steps.

use thiserror::Error;

/// Top-level error type for dataset, validation and feature-store operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Feature store error: {0}")]
    FeatureStore(String),

    #[error("Ingestion failed for {} row(s): {rows:?}", .rows.len())]
    Ingestion { rows: Vec<usize> },

    #[error("Configuration error: {0}")]
    Config(#[from] titanic_core::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn feature_store(msg: impl Into<String>) -> Self {
        Self::FeatureStore(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// A type alias for results using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;
