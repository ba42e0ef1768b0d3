//! Titanic CLI: run the feature pipeline steps standalone or as a local pipeline.

mod commands;

use clap::Parser;
use std::path::PathBuf;

/// Titanic feature pipeline: wrangle, engineer, validate and ingest passenger features
#[derive(Parser, Debug)]
#[command(name = "titanic", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Data directory used by the pipeline (overrides `data.data_path`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Local feature store directory (overrides `feature_store.base_dir`)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by every standalone step.
#[derive(clap::Args, Debug, Clone)]
struct StepOpts {
    /// Name of the step to be executed
    #[arg(long, default_value = titanic_ml::steps::DEFAULT_STEP_NAME)]
    step_name: String,

    /// Path to work with data
    #[arg(long)]
    data_path: PathBuf,

    /// Filename to extract the data from
    #[arg(long)]
    input_file: String,

    /// Filename to store the output data
    #[arg(long)]
    output_file: Option<String>,
}

impl Cli {
    /// Command-line values layered over every other configuration source.
    fn overrides(&self) -> titanic_core::ConfigOverrides {
        let mut overrides = titanic_core::ConfigOverrides::default();
        overrides.data.data_path = self.data_dir.clone();
        overrides.feature_store.base_dir = self.store_dir.clone();
        overrides
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Clean raw passenger data
    Wrangle(StepOpts),
    /// Derive engineered features from wrangled data
    Features(StepOpts),
    /// Validate engineered features
    Validate(StepOpts),
    /// Ingest validated features into a feature group
    Ingest {
        #[command(flatten)]
        step: StepOpts,

        /// Feature group to ingest into
        #[arg(short = 'f', long)]
        featuregroup_name: String,

        /// Feature store region
        #[arg(short, long, default_value = "eu-west-1")]
        region: String,

        /// Create the feature group from the data when it does not exist
        #[arg(long)]
        create_group: bool,
    },
    /// Show or run the local pipeline
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },
    /// Manage feature groups in the local feature store
    FeatureGroup {
        #[command(subcommand)]
        action: FeatureGroupAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum PipelineAction {
    /// Print the pipeline definition as JSON
    Show,
    /// Run every step in order
    Run {
        /// Create the feature group from the data when it does not exist
        #[arg(long)]
        create_group: bool,
    },
    /// List recorded executions
    Executions,
    /// Show one execution and its steps
    Describe {
        /// Execution id
        id: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum FeatureGroupAction {
    /// Create a feature group with definitions inferred from a CSV file
    Create {
        /// Feature group name
        name: String,
        /// CSV file to infer feature definitions from
        #[arg(long)]
        from_file: PathBuf,
        /// Description of the group
        #[arg(long)]
        description: Option<String>,
        /// Feature store region (defaults to the configured region)
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Describe a feature group
    Describe {
        name: String,
        #[arg(short, long)]
        region: Option<String>,
    },
    /// List feature groups
    List {
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Delete a feature group and its records
    Delete {
        name: String,
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Print a stored record
    Get {
        name: String,
        record_id: String,
        #[arg(short, long)]
        region: Option<String>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Resolve workspace
    let resolved = cli.workspace.canonicalize();
    let workspace = resolved.as_ref().unwrap_or(&cli.workspace).clone();

    let overrides = cli.overrides();
    let config = titanic_core::load_config(Some(&workspace), cli.config.as_deref(), Some(&overrides))
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;

    let _guard = titanic_core::logging::init_tracing(cli.verbose, cli.quiet, &config.logging)?;
    if let Err(e) = &resolved {
        tracing::warn!(workspace = %cli.workspace.display(), error = %e, "Could not canonicalize workspace");
    }
    config.validate()?;
    tracing::debug!(
        workspace = %workspace.display(),
        data_path = %config.data.data_path.display(),
        region = %config.feature_store.region,
        "Configuration loaded"
    );

    let ctx = commands::Context { workspace, config };
    commands::handle_command(cli.command, &ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::parse_from([
            "titanic",
            "ingest",
            "--data-path",
            "data",
            "--input-file",
            "validated_features.csv",
            "-f",
            "titanic-features",
        ]);
        match cli.command {
            Commands::Ingest {
                step,
                featuregroup_name,
                region,
                create_group,
            } => {
                assert_eq!(step.step_name, "generic");
                assert_eq!(featuregroup_name, "titanic-features");
                assert_eq!(region, "eu-west-1");
                assert!(!create_group);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_missing_mandatory_args_is_usage_error() {
        let err = Cli::try_parse_from(["titanic", "wrangle", "--data-path", "data"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = Cli::try_parse_from([
            "titanic",
            "ingest",
            "--data-path",
            "data",
            "--input-file",
            "x.csv",
        ])
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_directory_flags_become_overrides() {
        let cli = Cli::parse_from([
            "titanic",
            "pipeline",
            "run",
            "--data-dir",
            "bin",
            "--store-dir",
            "/tmp/store",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.data.data_path, Some(PathBuf::from("bin")));
        assert_eq!(overrides.feature_store.base_dir, Some(PathBuf::from("/tmp/store")));
        assert_eq!(overrides.feature_store.region, None);

        let cli = Cli::parse_from(["titanic", "config", "show"]);
        assert_eq!(cli.overrides(), titanic_core::ConfigOverrides::default());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["titanic", "pipeline", "show", "-vv", "-w", "/tmp"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.workspace, PathBuf::from("/tmp"));
        assert!(matches!(
            cli.command,
            Commands::Pipeline {
                action: PipelineAction::Show
            }
        ));
    }
}
