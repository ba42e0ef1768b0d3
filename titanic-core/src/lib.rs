//! # Titanic Core
//!
//! Shared plumbing for the Titanic feature pipeline: layered configuration,
//! error types, tracing setup and atomic JSON persistence.

pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;

pub use config::{
    ConfigOverrides, DataConfig, FeatureStoreConfig, LoggingConfig, PipelineConfig,
    ValidationConfig, load_config,
};
pub use error::{ConfigError, CoreError, Result};
