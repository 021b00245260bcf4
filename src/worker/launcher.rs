//! Runs one pipeline as a child process with a hard deadline.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use crate::paths::DATA_DIR_ENV;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Succeeded,
    Failed { exit_code: Option<i32> },
    TimedOut,
    SpawnFailed(String),
}

impl LaunchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[derive(Debug, Clone)]
pub struct SubprocessLauncher {
    command: Vec<String>,
    data_dir: PathBuf,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl SubprocessLauncher {
    pub fn new(command: Vec<String>, data_dir: PathBuf, working_dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            command,
            data_dir,
            working_dir,
            timeout,
        }
    }

    /// Full argument vector for one pipeline run.
    pub fn args_for(&self, item_id: i64, workflow_id: &str, patch: bool) -> Vec<String> {
        let mut args: Vec<String> = self.command.iter().skip(1).cloned().collect();
        args.extend([
            "run".to_string(),
            item_id.to_string(),
            "--workflow-id".to_string(),
            workflow_id.to_string(),
        ]);
        if patch {
            args.push("--patch".to_string());
        }
        args
    }

    /// Run the pipeline and wait for it, killing it once the timeout expires.
    ///
    /// The child gets its own process group so a Ctrl-C aimed at the worker
    /// does not interrupt the in-flight pipeline.
    pub async fn launch(&self, item_id: i64, workflow_id: &str, patch: bool) -> LaunchOutcome {
        let Some(program) = self.command.first() else {
            return LaunchOutcome::SpawnFailed("pipeline command is empty".to_string());
        };

        let mut cmd = Command::new(program);
        cmd.args(self.args_for(item_id, workflow_id, patch))
            .env(DATA_DIR_ENV, &self.data_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return LaunchOutcome::SpawnFailed(format!("{}: {}", program, e)),
        };
        tracing::debug!(item_id, workflow_id, pid = ?child.id(), "Pipeline process spawned");

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                tracing::debug!(item_id, elapsed_secs = start.elapsed().as_secs(), "Pipeline exited cleanly");
                LaunchOutcome::Succeeded
            }
            Ok(Ok(status)) => LaunchOutcome::Failed {
                exit_code: status.code(),
            },
            Ok(Err(e)) => LaunchOutcome::SpawnFailed(format!("failed to wait for pipeline: {}", e)),
            Err(_) => {
                // Agents spawned by the pipeline share its process group.
                if let Err(e) = kill_process_group(&child) {
                    tracing::warn!(item_id, error = %e, "Failed to kill pipeline process group");
                }
                if let Err(e) = child.kill().await {
                    tracing::warn!(item_id, error = %e, "Failed to kill timed-out pipeline");
                }
                LaunchOutcome::TimedOut
            }
        }
    }
}

/// SIGKILL every process in the child's group. The child leads its own
/// group (`process_group(0)`), so the group id is its pid.
#[cfg(unix)]
fn kill_process_group(child: &Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pgid = libc::pid_t::try_from(pid).map_err(std::io::Error::other)?;
    // SAFETY: killpg only takes plain integers.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) -> std::io::Result<()> {
    Ok(())
}
