use async_trait::async_trait;

use super::cli::AgentCommand;
use super::prompt::build_prompt;
use super::{AgentProvider, AgentRequest, ArtifactMap, parse_agent_output};
use crate::errors::StepExecutionError;

const DEFAULT_MODEL: &str = "zai-coding-plan/glm-4.6";

/// Runs steps through `opencode run --format json`.
pub struct OpenCodeProvider {
    cmd: String,
    model: String,
}

impl OpenCodeProvider {
    pub const NAME: &'static str = "opencode";

    pub fn new(cmd: impl Into<String>, model: Option<String>) -> Self {
        Self {
            cmd: cmd.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn command(&self, request: &AgentRequest) -> AgentCommand {
        let mut cmd = AgentCommand::new(&self.cmd).args(["run", "--model", self.model.as_str()]);
        if request.step.is_implementation() {
            cmd = cmd.args(["--command", "implement"]);
        }
        cmd.args(["--format", "json"])
            .arg(build_prompt(request))
            .current_dir(request.working_dir.clone())
    }
}

#[async_trait]
impl AgentProvider for OpenCodeProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<ArtifactMap, StepExecutionError> {
        let run = self.command(request).run(request.step).await?;
        let output = run.into_output(request.step)?;
        parse_agent_output(request.step, &request.produces, &output)
    }
}
