//! Agent providers: whatever turns a step's input artifacts into its outputs.
//!
//! The executor only knows the [`AgentProvider`] contract. Concrete providers:
//! - [`ClaudeProvider`] and [`OpenCodeProvider`] shell out to an agent CLI
//! - [`StoreFetchProvider`] reads issue text from the work queue

pub mod claude;
pub mod cli;
pub mod opencode;
pub mod prompt;
pub mod store;
pub mod stream;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::errors::{PipelineError, StepExecutionError};
use crate::queue::WorkQueue;
use crate::rouge_config::RougeConfig;
use crate::util::extract_json_object;
use crate::workflow::{ArtifactType, StepId};

pub use claude::ClaudeProvider;
pub use opencode::OpenCodeProvider;
pub use store::StoreFetchProvider;

/// Artifacts keyed by type, as exchanged with providers.
pub type ArtifactMap = BTreeMap<ArtifactType, Value>;

/// Everything a provider gets to execute one step.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub workflow_id: String,
    pub issue_id: i64,
    pub step: StepId,
    pub description: String,
    pub inputs: ArtifactMap,
    pub produces: Vec<ArtifactType>,
    /// Directory the agent works in (the repository being changed).
    pub working_dir: Option<PathBuf>,
}

#[async_trait]
pub trait AgentProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run one step. Must return a payload for every type in `request.produces`.
    async fn invoke(&self, request: &AgentRequest) -> Result<ArtifactMap, StepExecutionError>;
}

/// Named providers plus the routing of steps onto them.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn AgentProvider>>,
    default: Option<String>,
    routes: HashMap<StepId, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn AgentProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        self.ensure_known(name)?;
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn route(&mut self, step: StepId, name: &str) -> Result<()> {
        self.ensure_known(name)?;
        self.routes.insert(step, name.to_string());
        Ok(())
    }

    fn ensure_known(&self, name: &str) -> Result<()> {
        if !self.providers.contains_key(name) {
            let mut known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            known.sort_unstable();
            bail!("Unknown agent provider '{}' (registered: {})", name, known.join(", "));
        }
        Ok(())
    }

    /// Name of the provider that handles `step`.
    pub fn provider_name(&self, step: StepId) -> Option<&str> {
        self.routes
            .get(&step)
            .or(self.default.as_ref())
            .map(String::as_str)
    }

    pub fn provider_for(&self, step: StepId) -> Result<Arc<dyn AgentProvider>, PipelineError> {
        self.provider_name(step)
            .and_then(|name| self.providers.get(name))
            .cloned()
            .ok_or(PipelineError::NoProvider(step))
    }

    /// Build the standard routing from configuration: fetch steps read the
    /// queue, implementation steps use the implement provider, everything
    /// else uses the default provider.
    pub fn from_config(config: &RougeConfig, queue: Arc<dyn WorkQueue>) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(ClaudeProvider::new(
            config.claude_cmd(),
            config.toml.providers.model.clone(),
        )));
        registry.register(Arc::new(OpenCodeProvider::new(
            config.opencode_cmd(),
            config.toml.providers.opencode_model.clone(),
        )));
        registry.register(Arc::new(StoreFetchProvider::new(queue)));

        registry.set_default(&config.default_provider())?;
        let implement = config.implement_provider();
        for step in StepId::ALL {
            if step.is_fetch() {
                registry.route(step, StoreFetchProvider::NAME)?;
            } else if step.is_implementation() {
                registry.route(step, &implement)?;
            }
        }
        Ok(registry)
    }
}

/// Fragments in agent error output that indicate a transient condition.
const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "overloaded",
    "429",
    "529",
    "503",
    "temporarily unavailable",
    "connection reset",
    "econnreset",
    "timed out",
];

pub fn is_transient_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Turn an agent's final text into payloads for the produced types.
///
/// The first JSON object in the text is the payload. When a step produces
/// several types the object must have one key per type. Text without JSON
/// becomes `{"output": text}`.
pub fn parse_agent_output(
    step: StepId,
    produces: &[ArtifactType],
    text: &str,
) -> Result<ArtifactMap, StepExecutionError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StepExecutionError::fatal(step, "agent produced no output"));
    }

    let parsed = extract_json_object(text)
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .filter(Value::is_object);

    match (produces, parsed) {
        ([], _) => Ok(ArtifactMap::new()),
        ([single], Some(value)) => {
            // Unwrap `{"plan": {...}}` when the agent keyed its answer by type.
            let payload = match value.as_object() {
                Some(obj) if obj.len() == 1 && obj.contains_key(single.as_str()) => {
                    obj[single.as_str()].clone()
                }
                _ => value,
            };
            Ok(ArtifactMap::from([(*single, payload)]))
        }
        ([single], None) => Ok(ArtifactMap::from([(*single, json!({ "output": text }))])),
        (many, Some(value)) => many
            .iter()
            .map(|t| {
                value
                    .get(t.as_str())
                    .cloned()
                    .map(|v| (*t, v))
                    .ok_or_else(|| {
                        StepExecutionError::fatal(step, format!("agent output is missing '{}'", t))
                    })
            })
            .collect(),
        (_, None) => Err(StepExecutionError::fatal(
            step,
            "agent output contains no JSON object for a multi-artifact step",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl AgentProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn invoke(&self, _request: &AgentRequest) -> Result<ArtifactMap, StepExecutionError> {
            Ok(ArtifactMap::new())
        }
    }

    #[test]
    fn test_routing_falls_back_to_default() {
        let mut reg = ProviderRegistry::new();
        reg.register(Arc::new(Named("claude")));
        reg.register(Arc::new(Named("opencode")));
        reg.set_default("claude").unwrap();
        reg.route(StepId::Implement, "opencode").unwrap();

        assert_eq!(reg.provider_for(StepId::Plan).unwrap().name(), "claude");
        assert_eq!(reg.provider_for(StepId::Implement).unwrap().name(), "opencode");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut reg = ProviderRegistry::new();
        reg.register(Arc::new(Named("claude")));
        let err = reg.set_default("gpt").unwrap_err();
        assert!(err.to_string().contains("gpt"));
        assert!(err.to_string().contains("claude"));
    }

    #[test]
    fn test_no_provider_without_default() {
        let reg = ProviderRegistry::new();
        assert!(matches!(
            reg.provider_for(StepId::Plan),
            Err(PipelineError::NoProvider(StepId::Plan))
        ));
    }

    #[test]
    fn test_parse_single_json_payload() {
        let out = parse_agent_output(
            StepId::Classify,
            &[ArtifactType::Classification],
            r#"Sure! {"type": "bug", "complexity": "low"} hope that helps"#,
        )
        .unwrap();
        assert_eq!(out[&ArtifactType::Classification], json!({"type": "bug", "complexity": "low"}));
    }

    #[test]
    fn test_parse_unwraps_type_key() {
        let out = parse_agent_output(StepId::Plan, &[ArtifactType::Plan], r#"{"plan": {"steps": [1, 2]}}"#)
            .unwrap();
        assert_eq!(out[&ArtifactType::Plan], json!({"steps": [1, 2]}));
    }

    #[test]
    fn test_parse_plain_text_is_wrapped() {
        let out = parse_agent_output(StepId::Implement, &[ArtifactType::Implementation], "All done.")
            .unwrap();
        assert_eq!(out[&ArtifactType::Implementation], json!({"output": "All done."}));
    }

    #[test]
    fn test_parse_empty_output_is_fatal() {
        let err = parse_agent_output(StepId::Plan, &[ArtifactType::Plan], "  \n").unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_parse_multi_artifact() {
        let produces = [ArtifactType::Plan, ArtifactType::Review];
        let out = parse_agent_output(StepId::Plan, &produces, r#"{"plan": 1, "review": 2}"#).unwrap();
        assert_eq!(out.len(), 2);

        let err = parse_agent_output(StepId::Plan, &produces, r#"{"plan": 1}"#).unwrap_err();
        assert!(err.to_string().contains("review"));
    }

    #[test]
    fn test_transient_markers() {
        assert!(is_transient_failure("API Error: 529 Overloaded"));
        assert!(is_transient_failure("Rate limit reached for requests"));
        assert!(!is_transient_failure("Invalid API key"));
    }
}
