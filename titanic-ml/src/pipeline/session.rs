//! Local, sequential pipeline execution with file hand-off between steps.

use crate::data::lineage::DataLineage;
use crate::error::{PipelineError, Result};
use crate::features::store::FeatureStore;
use crate::pipeline::definition::{PipelineDefinition, StepDefinition, StepKind};
use crate::steps::{
    IngestionStep, PipelineStep, ProcessingStep, StepArgs, StepRunner, ValidationStep, WrangleStep,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use titanic_core::PipelineConfig;
use titanic_core::persistence::{atomic_write_json, load_json, load_json_dir};
use tracing::{error, info};
use uuid::Uuid;

/// Directory under the data path holding execution records.
pub const EXECUTIONS_DIR: &str = ".executions";

/// Status of a pipeline execution or one of its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    NotStarted,
    Executing,
    Succeeded,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::NotStarted => write!(f, "NotStarted"),
            ExecutionStatus::Executing => write!(f, "Executing"),
            ExecutionStatus::Succeeded => write!(f, "Succeeded"),
            ExecutionStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Execution record of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub name: String,
    pub kind: StepKind,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub rows_in: Option<usize>,
    pub rows_out: Option<usize>,
    pub output_path: Option<PathBuf>,
    pub failure_reason: Option<String>,
}

impl StepExecution {
    fn pending(definition: &StepDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            kind: definition.kind,
            status: ExecutionStatus::NotStarted,
            started_at: None,
            ended_at: None,
            rows_in: None,
            rows_out: None,
            output_path: None,
            failure_reason: None,
        }
    }
}

/// Execution record of a whole pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: Uuid,
    pub pipeline_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepExecution>,
    pub lineage: DataLineage,
    pub failure_reason: Option<String>,
}

impl PipelineExecution {
    pub fn list_steps(&self) -> &[StepExecution] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&StepExecution> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Runs pipeline definitions step by step inside a data directory.
pub struct LocalPipelineSession {
    data_path: PathBuf,
    config: PipelineConfig,
    store: Arc<dyn FeatureStore>,
    create_missing_group: bool,
}

impl LocalPipelineSession {
    pub fn new(data_path: impl Into<PathBuf>, config: PipelineConfig, store: Arc<dyn FeatureStore>) -> Self {
        Self {
            data_path: data_path.into(),
            config,
            store,
            create_missing_group: false,
        }
    }

    /// Let the ingestion step create the feature group from the data when it is missing.
    pub fn create_missing_group(mut self, create: bool) -> Self {
        self.create_missing_group = create;
        self
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    fn executions_dir(&self) -> PathBuf {
        self.data_path.join(EXECUTIONS_DIR)
    }

    fn execution_path(&self, id: &str) -> PathBuf {
        self.executions_dir().join(format!("{id}.json"))
    }

    fn save(&self, execution: &PipelineExecution) -> Result<()> {
        atomic_write_json(&self.execution_path(&execution.id.to_string()), execution)?;
        Ok(())
    }

    fn build_step(&self, kind: StepKind) -> Box<dyn PipelineStep> {
        match kind {
            StepKind::Wrangle => Box::new(WrangleStep::new()),
            StepKind::ProcessFeatures => Box::new(ProcessingStep::new()),
            StepKind::ValidateFeatures => Box::new(ValidationStep::from_config(&self.config.validation)),
            StepKind::Ingest => Box::new(
                IngestionStep::from_config(self.store.clone(), &self.config.feature_store)
                    .create_if_missing(self.create_missing_group),
            ),
        }
    }

    /// Execute every step in order. A failing step fails the execution and leaves the
    /// remaining steps `NotStarted`; the failed execution is returned, not an error.
    pub async fn start(&self, definition: &PipelineDefinition) -> Result<PipelineExecution> {
        let id = Uuid::new_v4();
        let source = definition
            .steps
            .first()
            .map(|s| self.data_path.join(&s.input_file).display().to_string())
            .unwrap_or_default();
        let mut execution = PipelineExecution {
            id,
            pipeline_name: definition.name.clone(),
            status: ExecutionStatus::Executing,
            started_at: Utc::now(),
            ended_at: None,
            steps: definition.steps.iter().map(StepExecution::pending).collect(),
            lineage: DataLineage::new(&id.to_string(), &source),
            failure_reason: None,
        };
        self.save(&execution)?;
        info!(pipeline = %definition.name, execution = %id, "Pipeline execution started");

        let runner = StepRunner::new(&self.config.data.index_column);
        for (i, step_def) in definition.steps.iter().enumerate() {
            execution.steps[i].status = ExecutionStatus::Executing;
            execution.steps[i].started_at = Some(Utc::now());
            self.save(&execution)?;

            let args = StepArgs {
                step_name: step_def.name.clone(),
                data_path: self.data_path.clone(),
                input_file: step_def.input_file.clone(),
                output_file: step_def.output_file.clone(),
            };
            let step = self.build_step(step_def.kind);
            let outcome = runner.run(&args, step.as_ref()).await;

            let record = &mut execution.steps[i];
            record.ended_at = Some(Utc::now());
            match outcome {
                Ok(output) => {
                    record.status = ExecutionStatus::Succeeded;
                    record.rows_in = Some(output.report.rows_in);
                    record.rows_out = Some(output.report.rows_out);
                    record.output_path = output.report.output_path.clone();
                    execution
                        .lineage
                        .record_step(&step_def.name, output.transforms, &output.batch);
                }
                Err(e) => {
                    error!(step = %step_def.name, error = %e, "Pipeline step failed");
                    record.status = ExecutionStatus::Failed;
                    record.failure_reason = Some(e.to_string());
                    execution.status = ExecutionStatus::Failed;
                    execution.failure_reason = Some(format!("Step {} failed: {e}", step_def.name));
                    break;
                }
            }
            self.save(&execution)?;
        }

        if execution.status == ExecutionStatus::Executing {
            execution.status = ExecutionStatus::Succeeded;
        }
        execution.ended_at = Some(Utc::now());
        self.save(&execution)?;
        info!(
            pipeline = %definition.name,
            execution = %id,
            status = %execution.status,
            "Pipeline execution finished"
        );
        Ok(execution)
    }

    /// Every recorded execution, newest first.
    pub fn list_executions(&self) -> Result<Vec<PipelineExecution>> {
        let mut executions: Vec<PipelineExecution> = load_json_dir(&self.executions_dir())?;
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions)
    }

    pub fn describe_execution(&self, id: &str) -> Result<PipelineExecution> {
        load_json(&self.execution_path(id))?
            .ok_or_else(|| PipelineError::not_found(format!("Pipeline execution '{id}'")))
    }
}
