//! Subcommand handlers.

use crate::{Commands, ConfigAction, FeatureGroupAction, PipelineAction, StepOpts};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use titanic_core::PipelineConfig;
use titanic_ml::data::source::{CsvSource, DataSource};
use titanic_ml::features::{
    FeatureGroupDescription, FeatureStore, LocalFeatureStore, load_feature_definitions,
    prepare_for_ingestion,
};
use titanic_ml::pipeline::{ExecutionStatus, LocalPipelineSession, PipelineDefinition, PipelineExecution};
use titanic_ml::steps::{
    IngestionStep, PipelineStep, ProcessingStep, StepArgs, StepReport, StepRunner, ValidationStep,
    WrangleStep,
};

/// Resolved workspace and configuration shared by every handler.
pub struct Context {
    pub workspace: PathBuf,
    pub config: PipelineConfig,
}

impl Context {
    fn store(&self, region: Option<&str>) -> LocalFeatureStore {
        let region = region.unwrap_or(&self.config.feature_store.region);
        LocalFeatureStore::new(self.config.store_dir_in(&self.workspace), region)
    }

    fn runner(&self) -> StepRunner {
        StepRunner::new(&self.config.data.index_column)
    }

    fn session(&self, create_group: bool) -> LocalPipelineSession {
        let store: Arc<dyn FeatureStore> = Arc::new(self.store(None));
        LocalPipelineSession::new(
            self.config.data_path_in(&self.workspace),
            self.config.clone(),
            store,
        )
        .create_missing_group(create_group)
    }
}

pub async fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Wrangle(opts) => run_step(ctx, &opts, &WrangleStep::new()).await,
        Commands::Features(opts) => run_step(ctx, &opts, &ProcessingStep::new()).await,
        Commands::Validate(opts) => {
            let step = ValidationStep::from_config(&ctx.config.validation);
            run_step(ctx, &opts, &step).await
        }
        Commands::Ingest {
            step,
            featuregroup_name,
            region,
            create_group,
        } => {
            let store: Arc<dyn FeatureStore> = Arc::new(ctx.store(Some(region.as_str())));
            let ingestion = IngestionStep::from_config(store, &ctx.config.feature_store)
                .with_group(&featuregroup_name)
                .create_if_missing(create_group);
            run_step(ctx, &step, &ingestion).await
        }
        Commands::Pipeline { action } => handle_pipeline(action, ctx).await,
        Commands::FeatureGroup { action } => handle_feature_group(action, ctx).await,
        Commands::Config { action } => handle_config(action, ctx),
    }
}

fn step_args(ctx: &Context, opts: &StepOpts) -> StepArgs {
    let data_path = if opts.data_path.is_absolute() {
        opts.data_path.clone()
    } else {
        ctx.workspace.join(&opts.data_path)
    };
    StepArgs {
        step_name: opts.step_name.clone(),
        data_path,
        input_file: opts.input_file.clone(),
        output_file: opts.output_file.clone(),
    }
}

async fn run_step(ctx: &Context, opts: &StepOpts, step: &dyn PipelineStep) -> anyhow::Result<()> {
    let args = step_args(ctx, opts);
    let output = ctx.runner().run(&args, step).await?;
    print_report(&output.report);
    Ok(())
}

fn print_report(report: &StepReport) {
    println!(
        "{}: {} rows in, {} rows x {} columns out ({:.4}s)",
        report.step_name, report.rows_in, report.rows_out, report.columns_out, report.elapsed_secs
    );
    if let Some(path) = &report.output_path {
        println!("  Output: {}", path.display());
    }
}

async fn handle_pipeline(action: PipelineAction, ctx: &Context) -> anyhow::Result<()> {
    let definition = PipelineDefinition::titanic(&ctx.config.data);
    match action {
        PipelineAction::Show => {
            println!("{}", definition.definition()?);
            Ok(())
        }
        PipelineAction::Run { create_group } => {
            let session = ctx.session(create_group);
            println!(
                "Starting pipeline '{}' in {}",
                definition.name,
                session.data_path().display()
            );
            tracing::info!(pipeline = %definition.name, create_group, "Running pipeline");
            let execution = session.start(&definition).await?;
            print_execution(&execution);
            if execution.status == ExecutionStatus::Failed {
                tracing::warn!(execution = %execution.id, "Pipeline execution failed");
                anyhow::bail!(
                    "Pipeline execution {} failed: {}",
                    execution.id,
                    execution.failure_reason.as_deref().unwrap_or("unknown reason")
                );
            }
            Ok(())
        }
        PipelineAction::Executions => {
            let executions = ctx.session(false).list_executions()?;
            if executions.is_empty() {
                println!("No pipeline executions recorded.");
            }
            for execution in executions {
                println!(
                    "{}  {}  {}  {}",
                    execution.id,
                    execution.pipeline_name,
                    execution.status,
                    execution.started_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Ok(())
        }
        PipelineAction::Describe { id } => {
            let execution = ctx.session(false).describe_execution(&id)?;
            print_execution(&execution);
            Ok(())
        }
    }
}

fn print_execution(execution: &PipelineExecution) {
    println!("Execution: {}", execution.id);
    println!("Pipeline: {}", execution.pipeline_name);
    println!("Status: {}", execution.status);
    println!("\nSteps:");
    for (i, step) in execution.list_steps().iter().enumerate() {
        let rows = match (step.rows_in, step.rows_out) {
            (Some(rows_in), Some(rows_out)) => format!(" ({rows_in} -> {rows_out} rows)"),
            _ => String::new(),
        };
        println!("  {}. {} [{}]{}", i + 1, step.name, step.status, rows);
        if let Some(reason) = &step.failure_reason {
            println!("     {reason}");
        }
    }
    println!("\nLineage head: {}", execution.lineage.head());
}

async fn handle_feature_group(action: FeatureGroupAction, ctx: &Context) -> anyhow::Result<()> {
    match action {
        FeatureGroupAction::Create {
            name,
            from_file,
            description,
            region,
        } => {
            let store = ctx.store(region.as_deref());
            let fs = &ctx.config.feature_store;
            let batch = CsvSource::new(resolve(&ctx.workspace, &from_file))
                .with_index(&ctx.config.data.index_column)
                .load(None)
                .await?;
            let batch =
                prepare_for_ingestion(batch, &fs.record_identifier_name, &fs.event_time_feature_name)?;
            let mut group = FeatureGroupDescription::new(
                &name,
                &fs.record_identifier_name,
                &fs.event_time_feature_name,
                load_feature_definitions(&batch),
                store.region(),
            );
            if let Some(description) = description {
                group = group.with_description(description);
            }
            let features = group.feature_definitions.len();
            tracing::debug!(group = %name, features, "Inferred feature definitions");
            store.create_group(group).await?;
            println!(
                "Created feature group '{name}' in {} with {features} features",
                store.region()
            );
            Ok(())
        }
        FeatureGroupAction::Describe { name, region } => {
            let group = ctx.store(region.as_deref()).describe(&name).await?;
            println!("{}", serde_json::to_string_pretty(&group)?);
            Ok(())
        }
        FeatureGroupAction::List { region } => {
            let store = ctx.store(region.as_deref());
            let groups = store.list_groups().await?;
            if groups.is_empty() {
                println!("No feature groups in {}.", store.region());
            } else {
                println!("Feature groups in {} ({}):", store.region(), groups.len());
                for group in groups {
                    println!(
                        "  {} - {} features, id: {}, event time: {}",
                        group.name,
                        group.feature_definitions.len(),
                        group.record_identifier_feature_name,
                        group.event_time_feature_name
                    );
                }
            }
            Ok(())
        }
        FeatureGroupAction::Delete { name, region } => {
            ctx.store(region.as_deref()).delete_group(&name).await?;
            println!("Deleted feature group '{name}'");
            Ok(())
        }
        FeatureGroupAction::Get {
            name,
            record_id,
            region,
        } => {
            match ctx.store(region.as_deref()).get_record(&name, &record_id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("Record '{record_id}' not found in '{name}'"),
            }
            Ok(())
        }
    }
}

fn handle_config(action: ConfigAction, ctx: &Context) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            if titanic_core::config::workspace_config_path(&ctx.workspace).exists() {
                println!(
                    "Configuration file already exists at: {}",
                    titanic_core::config::workspace_config_path(&ctx.workspace).display()
                );
                return Ok(());
            }
            let path = titanic_core::config::write_default_config(&ctx.workspace)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(&ctx.config)?);
            Ok(())
        }
    }
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}
