use async_trait::async_trait;

use super::cli::AgentCommand;
use super::prompt::build_prompt;
use super::{AgentProvider, AgentRequest, ArtifactMap, parse_agent_output};
use crate::errors::StepExecutionError;

/// Runs steps through the `claude` CLI in print mode with streamed JSON output.
pub struct ClaudeProvider {
    cmd: String,
    model: Option<String>,
}

impl ClaudeProvider {
    pub const NAME: &'static str = "claude";

    pub fn new(cmd: impl Into<String>, model: Option<String>) -> Self {
        Self {
            cmd: cmd.into(),
            model,
        }
    }

    pub fn command(&self, request: &AgentRequest) -> AgentCommand {
        let mut cmd = AgentCommand::new(&self.cmd).args(["-p".to_string(), build_prompt(request)]);
        if let Some(model) = &self.model {
            cmd = cmd.args(["--model", model.as_str()]);
        }
        cmd.args([
            "--output-format",
            "stream-json",
            "--verbose",
            "--dangerously-skip-permissions",
        ])
        .current_dir(request.working_dir.clone())
    }
}

#[async_trait]
impl AgentProvider for ClaudeProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<ArtifactMap, StepExecutionError> {
        let run = self.command(request).run(request.step).await?;
        let session = run.transcript.session_id.clone();
        let output = run.into_output(request.step)?;
        tracing::debug!(
            step = %request.step,
            session_id = session.as_deref().unwrap_or("-"),
            "Claude step finished"
        );
        parse_agent_output(request.step, &request.produces, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ArtifactType, StepId};

    fn request() -> AgentRequest {
        AgentRequest {
            workflow_id: "abc".into(),
            issue_id: 1,
            step: StepId::Plan,
            description: String::new(),
            inputs: ArtifactMap::new(),
            produces: vec![ArtifactType::Plan],
            working_dir: None,
        }
    }

    #[test]
    fn test_command_flags() {
        let provider = ClaudeProvider::new("claude", Some("opus".into()));
        let cmd = provider.command(&request());
        assert_eq!(cmd.program, "claude");
        assert_eq!(cmd.args[0], "-p");
        let rest = &cmd.args[2..];
        assert_eq!(
            rest,
            [
                "--model",
                "opus",
                "--output-format",
                "stream-json",
                "--verbose",
                "--dangerously-skip-permissions"
            ]
        );
    }

    #[test]
    fn test_model_is_optional() {
        let cmd = ClaudeProvider::new("/opt/claude", None).command(&request());
        assert!(!cmd.args.iter().any(|a| a == "--model"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_parses_result() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-claude");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '{\"type\":\"result\",\"result\":\"{\\\"plan\\\":{\\\"steps\\\":2}}\",\"is_error\":false}'\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let provider = ClaudeProvider::new(script.to_string_lossy(), None);
        let out = provider.invoke(&request()).await.unwrap();
        assert_eq!(out[&ArtifactType::Plan], serde_json::json!({"steps": 2}));
    }
}
