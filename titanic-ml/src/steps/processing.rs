//! Feature engineering: travel hours, age groups, the alone flag and fare inflation.

use crate::data::schema::ColumnType;
use crate::data::source::DataBatch;
use crate::data::transform::{TransformPipeline, TransformRecord, TransformStep};
use crate::error::Result;
use crate::steps::PipelineStep;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Hours of travel from each embarkation port.
pub const HOURS_TRAVELING: &[(&str, f64)] = &[("Q", 85.0), ("C", 102.0), ("S", 108.0)];

/// Right-closed age bucket edges.
pub const AGE_BOUNDARIES: &[f64] = &[0.0, 3.0, 10.0, 18.0, 30.0, 50.0, 70.0, 100.0];

pub const AGE_LABELS: &[&str] = &[
    "babies",
    "children",
    "teenagers",
    "young",
    "adults",
    "seniors",
    "elders",
];

/// Fare inflation factor.
pub const FARE_INFLATION: f64 = 100.0;

/// The feature engineering plan.
pub fn feature_plan() -> TransformPipeline {
    let mapping: BTreeMap<String, Value> = HOURS_TRAVELING
        .iter()
        .map(|(port, hours)| (port.to_string(), json!(hours)))
        .collect();

    TransformPipeline::new()
        .add_step(TransformStep::MapValues {
            column: "embarked".into(),
            output: "hours_traveling".into(),
            mapping,
            dtype: Some(ColumnType::Float),
        })
        .add_step(TransformStep::Bucketize {
            column: "age".into(),
            output: "age_group".into(),
            boundaries: AGE_BOUNDARIES.to_vec(),
            labels: AGE_LABELS.iter().map(|l| l.to_string()).collect(),
        })
        .add_step(TransformStep::DropColumn {
            column: "age".into(),
        })
        .add_step(TransformStep::ConditionFlag {
            columns: vec!["sibsp".into(), "parch".into()],
            equals: json!(0),
            output: "alone".into(),
            when_true: json!("yes"),
            when_false: json!("no"),
        })
        .add_step(TransformStep::Scale {
            column: "fare".into(),
            factor: FARE_INFLATION,
        })
}

/// Derive the engineered features from wrangled data.
#[derive(Debug, Clone)]
pub struct ProcessingStep {
    plan: TransformPipeline,
}

impl ProcessingStep {
    pub fn new() -> Self {
        Self {
            plan: feature_plan(),
        }
    }
}

impl Default for ProcessingStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStep for ProcessingStep {
    fn name(&self) -> &'static str {
        "process_features"
    }

    async fn process(&self, batch: DataBatch) -> Result<DataBatch> {
        self.plan.apply(batch)
    }

    async fn process_recorded(&self, batch: DataBatch) -> Result<(DataBatch, Vec<TransformRecord>)> {
        self.plan.apply_recorded(batch)
    }
}
