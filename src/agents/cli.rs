//! Spawning an agent CLI and collecting its streamed output.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::is_transient_failure;
use super::stream::Transcript;
use crate::errors::StepExecutionError;
use crate::workflow::StepId;

/// One agent CLI invocation.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// What came back from a finished agent process.
#[derive(Debug)]
pub struct AgentRun {
    pub transcript: Transcript,
    pub stderr: String,
    pub success: bool,
    pub exit_code: Option<i32>,
}

impl AgentCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Run to completion, streaming stdout into a [`Transcript`].
    ///
    /// The child is killed if this future is dropped (e.g. by a step timeout).
    pub async fn run(&self, step: StepId) -> Result<AgentRun, StepExecutionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(step = %step, program = %self.program, args = self.args.len(), "Spawning agent");

        let mut child = cmd.spawn().map_err(|e| {
            let message = if e.kind() == ErrorKind::NotFound {
                format!("agent command '{}' not found", self.program)
            } else {
                format!("failed to spawn '{}': {}", self.program, e)
            };
            StepExecutionError::fatal(step, message)
        })?;

        // Drain stderr concurrently so a chatty agent cannot fill the pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut transcript = Transcript::default();
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => transcript.push_line(&line),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(step = %step, error = %e, "Error reading agent output");
                        break;
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| StepExecutionError::fatal(step, format!("failed to wait for agent: {}", e)))?;

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        tracing::debug!(
            step = %step,
            exit_code = ?status.code(),
            tool_uses = transcript.tool_uses,
            "Agent exited"
        );

        Ok(AgentRun {
            transcript,
            stderr,
            success: status.success(),
            exit_code: status.code(),
        })
    }
}

impl AgentRun {
    /// The agent's final answer, or the classified failure.
    ///
    /// Failures mentioning rate limits, overload and similar transient
    /// conditions are recoverable; anything else is fatal.
    pub fn into_output(self, step: StepId) -> Result<String, StepExecutionError> {
        let output = self.transcript.output();
        if self.success && !self.transcript.is_error {
            return Ok(output);
        }

        let detail = [output.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        let message = match (self.exit_code, detail.is_empty()) {
            (Some(code), true) => format!("agent exited with status {}", code),
            (Some(code), false) => format!("agent exited with status {}: {}", code, detail),
            (None, true) => "agent was terminated by a signal".to_string(),
            (None, false) => format!("agent reported an error: {}", detail),
        };
        let message = if self.success {
            format!("agent reported an error: {}", detail)
        } else {
            message
        };

        if is_transient_failure(&detail) {
            Err(StepExecutionError::recoverable(step, message))
        } else {
            Err(StepExecutionError::fatal(step, message))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> AgentCommand {
        AgentCommand::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_collects_result_event() {
        let run = sh(r#"echo '{"type":"result","result":"{\"ok\":true}","is_error":false}'"#)
            .run(StepId::Plan)
            .await
            .unwrap();
        assert!(run.success);
        assert_eq!(run.into_output(StepId::Plan).unwrap(), r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_rate_limit_is_recoverable() {
        let run = sh("echo 'Error: rate limit exceeded' >&2; exit 1")
            .run(StepId::Plan)
            .await
            .unwrap();
        let err = run.into_output(StepId::Plan).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("status 1"));
    }

    #[tokio::test]
    async fn test_other_failure_is_fatal() {
        let run = sh("echo 'invalid api key' >&2; exit 2").run(StepId::Plan).await.unwrap();
        let err = run.into_output(StepId::Plan).unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_error_result_with_zero_exit() {
        let run = sh(r#"echo '{"type":"result","result":"API Error: 529 overloaded","is_error":true}'"#)
            .run(StepId::Review)
            .await
            .unwrap();
        let err = run.into_output(StepId::Review).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let err = AgentCommand::new("/nonexistent/rouge-agent")
            .run(StepId::Plan)
            .await
            .unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("not found"));
    }
}
