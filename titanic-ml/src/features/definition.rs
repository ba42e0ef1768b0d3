//! Feature definitions and feature-group descriptions.

use crate::data::schema::{ColumnType, infer_schema};
use crate::data::source::DataBatch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feature value type as understood by the feature store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureType {
    Integral,
    Fractional,
    String,
}

impl FeatureType {
    pub fn from_column_type(dtype: ColumnType) -> Self {
        match dtype {
            ColumnType::Integer => Self::Integral,
            ColumnType::Float => Self::Fractional,
            _ => Self::String,
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integral => "Integral",
            Self::Fractional => "Fractional",
            Self::String => "String",
        };
        f.write_str(name)
    }
}

/// A feature definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDefinition {
    pub name: String,
    pub dtype: FeatureType,
}

impl FeatureDefinition {
    pub fn new(name: &str, dtype: FeatureType) -> Self {
        Self {
            name: name.to_string(),
            dtype,
        }
    }
}

/// Description of a feature group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureGroupDescription {
    pub name: String,
    pub record_identifier_feature_name: String,
    pub event_time_feature_name: String,
    pub feature_definitions: Vec<FeatureDefinition>,
    pub region: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FeatureGroupDescription {
    pub fn new(
        name: &str,
        record_identifier_feature_name: &str,
        event_time_feature_name: &str,
        feature_definitions: Vec<FeatureDefinition>,
        region: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            record_identifier_feature_name: record_identifier_feature_name.to_string(),
            event_time_feature_name: event_time_feature_name.to_string(),
            feature_definitions,
            region: region.to_string(),
            created_at: chrono::Utc::now(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureDefinition> {
        self.feature_definitions.iter().find(|f| f.name == name)
    }
}

/// Infer feature definitions from the columns of a batch.
pub fn load_feature_definitions(batch: &DataBatch) -> Vec<FeatureDefinition> {
    infer_schema(&batch.columns, &batch.rows)
        .columns
        .into_iter()
        .map(|column| FeatureDefinition::new(&column.name, FeatureType::from_column_type(column.dtype)))
        .collect()
}
