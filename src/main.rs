use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rouge::paths::RougePaths;
use rouge::rouge_config::RougeConfig;
use rouge::telemetry::{self, LogFormat, TelemetryConfig};
use rouge::worker::load_env_file;

mod cmd;

#[derive(Parser)]
#[command(name = "rouge")]
#[command(version, about = "Issue-to-patch workflow orchestrator")]
pub struct Cli {
    /// Data directory (defaults to $ROUGE_DATA_DIR or ~/.rouge)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format: pretty or json
    #[arg(long, global = true, default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and run pipeline steps
    Step {
        #[command(subcommand)]
        command: StepCommands,
    },
    /// Inspect stored workflow artifacts
    Artifact {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
    /// Run the full pipeline for one issue
    Run {
        /// Issue id in the work queue
        issue_id: i64,

        /// Workflow id to use or resume (generated if omitted)
        #[arg(long)]
        workflow_id: Option<String>,

        /// Run the patch pipeline instead of the main one
        #[arg(long)]
        patch: bool,

        /// Copy artifacts from an earlier workflow before running
        #[arg(long)]
        resume_from: Option<String>,
    },
    /// Poll the work queue and run pipelines as they are claimed
    Worker {
        /// Worker identity, e.g. alleycat-1
        #[arg(long)]
        worker_id: String,

        /// Seconds between polls
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Seconds before a running pipeline is killed
        #[arg(long)]
        workflow_timeout: Option<u64>,

        /// Directory the pipeline runs in; its .env (or its parent's) is loaded
        #[arg(long)]
        working_dir: Option<PathBuf>,
    },
    /// Administer the work queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum StepCommands {
    /// List registered steps in registration order
    List,
    /// Run a single step
    Run {
        /// Step name, e.g. plan
        name: String,

        #[arg(long)]
        issue_id: i64,

        /// Required unless the step has no inputs
        #[arg(long)]
        workflow_id: Option<String>,
    },
    /// Show the steps a step depends on, in execution order
    Deps { name: String },
    /// Validate the step graph
    Validate,
}

#[derive(Subcommand, Clone)]
pub enum ArtifactCommands {
    /// List artifacts stored for a workflow
    List { workflow_id: String },
    /// Print an artifact
    Show {
        workflow_id: String,
        artifact_type: String,
        /// Print the whole envelope, not just the payload
        #[arg(long)]
        raw: bool,
    },
    /// Delete an artifact so its producing step runs again
    Delete {
        workflow_id: String,
        artifact_type: String,
    },
    /// List artifact types
    Types,
    /// Print the directory holding a workflow's artifacts
    Path { workflow_id: String },
}

#[derive(Subcommand, Clone)]
pub enum QueueCommands {
    /// Add an issue to the queue
    Add {
        description: String,

        /// Worker the issue is assigned to
        #[arg(long)]
        assign_to: Option<String>,

        /// Enqueue as a patch request against this issue
        #[arg(long, value_name = "ISSUE_ID")]
        patch_of: Option<i64>,
    },
    /// List recent issues
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Put an issue back to pending
    Reset { issue_id: i64 },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default rouge.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env may set ROUGE_DATA_DIR, so load it before resolving paths.
    match &cli.command {
        Commands::Worker {
            working_dir: Some(dir),
            ..
        } => {
            load_env_file(dir);
        }
        _ => {
            let _ = dotenvy::dotenv();
        }
    }

    let paths = RougePaths::resolve(cli.data_dir.as_deref())?;
    let config = RougeConfig::load(paths)?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level());
    let logs_dir = config.paths.logs_dir();
    let worker_log = match &cli.command {
        Commands::Worker { worker_id, .. } => Some(RougePaths::worker_log_name(worker_id)),
        _ => None,
    };
    let _guard = telemetry::init(&TelemetryConfig {
        level: &level,
        format: cli.log_format,
        file: worker_log.as_deref().map(|name| (logs_dir.as_path(), name)),
    })?;

    match &cli.command {
        Commands::Step { command } => cmd::cmd_step(&config, command.clone()).await?,
        Commands::Artifact { command } => cmd::cmd_artifact(&config, command.clone())?,
        Commands::Run {
            issue_id,
            workflow_id,
            patch,
            resume_from,
        } => {
            cmd::cmd_run(&config, *issue_id, workflow_id.clone(), *patch, resume_from.clone()).await?;
        }
        Commands::Worker {
            worker_id,
            poll_interval,
            workflow_timeout,
            working_dir,
        } => {
            cmd::cmd_worker(&config, worker_id, *poll_interval, *workflow_timeout, working_dir.clone())
                .await?;
        }
        Commands::Queue { command } => cmd::cmd_queue(&config, command.clone()).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
