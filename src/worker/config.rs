use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::queue::WorkerId;
use crate::rouge_config::RougeConfig;

/// Settings for one worker daemon.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: WorkerId,
    pub poll_interval: Duration,
    pub workflow_timeout: Duration,
    /// Directory the pipeline runs in (the target repository).
    pub working_dir: Option<PathBuf>,
    /// Data directory handed to the pipeline process.
    pub data_dir: PathBuf,
    /// Program and leading arguments; `run <issue> --workflow-id <id>` is appended.
    pub pipeline_command: Vec<String>,
}

impl WorkerConfig {
    /// Build from configuration, letting CLI values override.
    pub fn from_config(
        config: &RougeConfig,
        worker_id: WorkerId,
        poll_interval: Option<Duration>,
        workflow_timeout: Option<Duration>,
        working_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let worker = Self {
            worker_id,
            poll_interval: poll_interval.unwrap_or_else(|| config.poll_interval()),
            workflow_timeout: workflow_timeout.unwrap_or_else(|| config.workflow_timeout()),
            working_dir,
            data_dir: config.data_dir().to_path_buf(),
            pipeline_command: resolve_pipeline_command(config.pipeline_command().as_deref())?,
        };
        worker.validate()?;
        Ok(worker)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("Poll interval must be positive");
        }
        if self.workflow_timeout.is_zero() {
            bail!("Workflow timeout must be positive");
        }
        if self.pipeline_command.is_empty() {
            bail!("Pipeline command is empty");
        }
        if let Some(dir) = &self.working_dir
            && !dir.is_dir()
        {
            bail!("Working directory does not exist: {}", dir.display());
        }
        Ok(())
    }
}

/// Split an explicit pipeline command on whitespace, or fall back to this
/// executable.
pub fn resolve_pipeline_command(explicit: Option<&str>) -> Result<Vec<String>> {
    if let Some(cmd) = explicit {
        let parts: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
        if parts.is_empty() {
            bail!("Pipeline command is empty");
        }
        return Ok(parts);
    }
    let exe = std::env::current_exe().context("Failed to locate the rouge executable")?;
    Ok(vec![exe.display().to_string()])
}

/// Load `.env` from the working directory, or failing that its parent.
/// Variables already set in the environment are left alone.
pub fn load_env_file(working_dir: &Path) -> Option<PathBuf> {
    let candidates = [
        Some(working_dir.join(".env")),
        working_dir.parent().map(|p| p.join(".env")),
    ];
    for path in candidates.into_iter().flatten() {
        if path.is_file() {
            match dotenvy::from_path(&path) {
                Ok(()) => return Some(path),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to load .env file"),
            }
        }
    }
    None
}
