//! Pipeline steps and the runner that wraps each one with CSV input and output.

pub mod ingestion;
pub mod processing;
pub mod validation;
pub mod wrangle;

pub use ingestion::IngestionStep;
pub use processing::{ProcessingStep, feature_plan};
pub use validation::{ValidationStep, titanic_schema};
pub use wrangle::{WrangleStep, wrangle_plan};

use crate::data::source::{CsvSource, DataBatch, DataSource, write_csv};
use crate::data::transform::TransformRecord;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Step name used when none is given.
pub const DEFAULT_STEP_NAME: &str = "generic";

/// A single table-to-table step.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Canonical name of the step.
    fn name(&self) -> &'static str;

    async fn process(&self, batch: DataBatch) -> Result<DataBatch>;

    /// Like [`process`](Self::process), also returning the transforms applied.
    async fn process_recorded(&self, batch: DataBatch) -> Result<(DataBatch, Vec<TransformRecord>)> {
        Ok((self.process(batch).await?, Vec::new()))
    }
}

/// Arguments of a standalone step run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepArgs {
    pub step_name: String,
    pub data_path: PathBuf,
    pub input_file: String,
    pub output_file: Option<String>,
}

impl StepArgs {
    pub fn new(data_path: impl Into<PathBuf>, input_file: &str) -> Self {
        Self {
            step_name: DEFAULT_STEP_NAME.to_string(),
            data_path: data_path.into(),
            input_file: input_file.to_string(),
            output_file: None,
        }
    }

    pub fn with_step_name(mut self, name: &str) -> Self {
        self.step_name = name.to_string();
        self
    }

    pub fn with_output(mut self, output_file: &str) -> Self {
        self.output_file = Some(output_file.to_string());
        self
    }

    pub fn input_path(&self) -> PathBuf {
        self.data_path.join(&self.input_file)
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.output_file.as_ref().map(|f| self.data_path.join(f))
    }
}

/// Summary of a step run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step_name: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub columns_out: usize,
    pub elapsed_secs: f64,
    pub output_path: Option<PathBuf>,
}

/// Everything a step run produced.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub batch: DataBatch,
    pub report: StepReport,
    pub transforms: Vec<TransformRecord>,
}

/// Reads the input CSV, applies a step and writes the output CSV.
#[derive(Debug, Clone)]
pub struct StepRunner {
    index_column: String,
}

impl StepRunner {
    pub fn new(index_column: &str) -> Self {
        Self {
            index_column: index_column.to_string(),
        }
    }

    pub async fn run(&self, args: &StepArgs, step: &dyn PipelineStep) -> Result<StepOutput> {
        info!(?args, "Received arguments");
        info!("Starting step {}", args.step_name);
        let started = Instant::now();

        let source = CsvSource::new(args.input_path()).with_index(&self.index_column);
        let batch = source.load(None).await?;
        let rows_in = batch.row_count();

        let (batch, transforms) = step.process_recorded(batch).await?;

        let output_path = args.output_path();
        if let Some(path) = &output_path {
            write_csv(&batch, path)?;
        }

        let elapsed = started.elapsed().as_secs_f64();
        info!("Finished {} Step after {elapsed:.4} seconds.", args.step_name);

        let report = StepReport {
            step_name: args.step_name.clone(),
            rows_in,
            rows_out: batch.row_count(),
            columns_out: batch.column_count(),
            elapsed_secs: elapsed,
            output_path,
        };
        Ok(StepOutput {
            batch,
            report,
            transforms,
        })
    }
}
