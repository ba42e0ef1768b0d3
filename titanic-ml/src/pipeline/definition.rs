//! Static definition of the feature-group pipeline.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use titanic_core::DataConfig;

pub const PIPELINE_NAME: &str = "titanic-featuregroup";

/// Orchestrator step type. Every step here is a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    Processing,
}

/// Which step implementation a definition runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Wrangle,
    ProcessFeatures,
    ValidateFeatures,
    Ingest,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Wrangle => write!(f, "wrangle"),
            StepKind::ProcessFeatures => write!(f, "process_features"),
            StepKind::ValidateFeatures => write!(f, "validate_features"),
            StepKind::Ingest => write!(f, "ingest"),
        }
    }
}

/// A named step of the pipeline and the files it hands over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub step_type: StepType,
    pub kind: StepKind,
    pub input_file: String,
    #[serde(default)]
    pub output_file: Option<String>,
}

impl StepDefinition {
    fn processing(name: &str, kind: StepKind, input_file: &str, output_file: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            step_type: StepType::Processing,
            kind,
            input_file: input_file.to_string(),
            output_file: output_file.map(str::to_string),
        }
    }
}

/// An ordered list of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub description: String,
    pub steps: Vec<StepDefinition>,
}

impl PipelineDefinition {
    /// The four-step Titanic pipeline wired to the configured file names.
    pub fn titanic(data: &DataConfig) -> Self {
        Self {
            name: PIPELINE_NAME.to_string(),
            description: "local pipeline example".to_string(),
            steps: vec![
                StepDefinition::processing(
                    "WrangleData",
                    StepKind::Wrangle,
                    &data.raw_file,
                    Some(&data.wrangled_file),
                ),
                StepDefinition::processing(
                    "FeatureEngineering",
                    StepKind::ProcessFeatures,
                    &data.wrangled_file,
                    Some(&data.processed_file),
                ),
                StepDefinition::processing(
                    "FeatureValidation",
                    StepKind::ValidateFeatures,
                    &data.processed_file,
                    Some(&data.validated_file),
                ),
                StepDefinition::processing(
                    "IngestFeatureGroup",
                    StepKind::Ingest,
                    &data.validated_file,
                    None,
                ),
            ],
        }
    }

    /// JSON rendering of the definition.
    pub fn definition(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }
}
