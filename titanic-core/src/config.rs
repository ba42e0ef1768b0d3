//! Configuration system for the feature pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/titanic/config.toml` and/or `.titanic/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Directory (relative to the workspace) holding the workspace-level config file.
pub const WORKSPACE_CONFIG_DIR: &str = ".titanic";

/// Top-level configuration for the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub feature_store: FeatureStoreConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the step CSV files live and how they are named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory the steps read from and write to.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Raw dataset file name.
    #[serde(default = "default_raw_file")]
    pub raw_file: String,
    /// Output of the wrangling step.
    #[serde(default = "default_wrangled_file")]
    pub wrangled_file: String,
    /// Output of the feature-engineering step.
    #[serde(default = "default_processed_file")]
    pub processed_file: String,
    /// Output of the validation step.
    #[serde(default = "default_validated_file")]
    pub validated_file: String,
    /// Column used as the dataset index.
    #[serde(default = "default_index_column")]
    pub index_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            raw_file: default_raw_file(),
            wrangled_file: default_wrangled_file(),
            processed_file: default_processed_file(),
            validated_file: default_validated_file(),
            index_column: default_index_column(),
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_raw_file() -> String {
    "titanic.csv".to_string()
}

fn default_wrangled_file() -> String {
    "wrangled_data.csv".to_string()
}

fn default_processed_file() -> String {
    "processed_features.csv".to_string()
}

fn default_validated_file() -> String {
    "validated_features.csv".to_string()
}

fn default_index_column() -> String {
    "PassengerId".to_string()
}

/// Feature store connection and ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStoreConfig {
    /// Root directory of the local feature store.
    #[serde(default = "default_store_dir")]
    pub base_dir: PathBuf,
    /// Region the feature groups are scoped to.
    #[serde(default = "default_region")]
    pub region: String,
    /// Feature group the ingestion step writes to.
    #[serde(default = "default_group_name")]
    pub group_name: String,
    /// Record identifier used when a group is created from a dataset.
    #[serde(default = "default_record_identifier")]
    pub record_identifier_name: String,
    /// Event-time feature used when a group is created from a dataset.
    #[serde(default = "default_event_time")]
    pub event_time_feature_name: String,
    /// Rows handled by each ingestion worker.
    #[serde(default = "default_rows_per_worker")]
    pub rows_per_worker: usize,
}

impl Default for FeatureStoreConfig {
    fn default() -> Self {
        Self {
            base_dir: default_store_dir(),
            region: default_region(),
            group_name: default_group_name(),
            record_identifier_name: default_record_identifier(),
            event_time_feature_name: default_event_time(),
            rows_per_worker: default_rows_per_worker(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".titanic/feature-store")
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

fn default_group_name() -> String {
    "titanic-features".to_string()
}

fn default_record_identifier() -> String {
    "PassengerId".to_string()
}

fn default_event_time() -> String {
    "EventTime".to_string()
}

fn default_rows_per_worker() -> usize {
    50_000
}

/// Feature validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Significance level of the survival hypothesis test.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Run the survival hypothesis test.
    #[serde(default = "default_true")]
    pub hypothesis: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            hypothesis: true,
        }
    }
}

fn default_alpha() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

/// Structured log file settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the JSON log files (defaults to the platform data dir).
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Disable the JSON file layer.
    #[serde(default)]
    pub disable_file_log: bool,
}

impl PipelineConfig {
    /// Reject values no step can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.validation.alpha > 0.0 && self.validation.alpha < 1.0) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "validation.alpha must be in (0, 1), got {}",
                    self.validation.alpha
                ),
            });
        }
        if self.feature_store.rows_per_worker == 0 {
            return Err(ConfigError::Invalid {
                message: "feature_store.rows_per_worker must be positive".into(),
            });
        }
        if self.data.index_column.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "data.index_column must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Resolve the data path against a workspace when it is relative.
    pub fn data_path_in(&self, workspace: &Path) -> PathBuf {
        resolve(workspace, &self.data.data_path)
    }

    /// Resolve the feature store directory against a workspace when it is relative.
    pub fn store_dir_in(&self, workspace: &Path) -> PathBuf {
        resolve(workspace, &self.feature_store.base_dir)
    }
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "titanic", "titanic")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_CONFIG_DIR).join("config.toml")
}

/// Values given on the command line. Unset fields leave the lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigOverrides {
    pub data: DataOverrides,
    pub feature_store: FeatureStoreOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureStoreOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `TITANIC_`)
/// 3. An explicit config file, if given
/// 4. Workspace-local config (`.titanic/config.toml`)
/// 5. User config (`~/.config/titanic/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = config_file {
        figment = figment.merge(Toml::file(file));
    }

    // TITANIC_FEATURE_STORE__REGION, TITANIC_VALIDATION__ALPHA, ...
    figment = figment.merge(Env::prefixed("TITANIC_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Render the built-in defaults as TOML.
pub fn default_config_toml() -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(&PipelineConfig::default())?)
}

/// Write the default configuration to `.titanic/config.toml` in the workspace.
///
/// Refuses to overwrite an existing file.
pub fn write_default_config(workspace: &Path) -> crate::error::Result<PathBuf> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(ConfigError::AlreadyExists { path }.into());
    }
    let content = default_config_toml()?;
    crate::persistence::atomic_write(&path, content.as_bytes())?;
    Ok(path)
}
