//! Built-in issue → patch step set.

use crate::errors::RegistryError;
use crate::rouge_config::RougeToml;
use crate::workflow::artifacts::ArtifactType as A;
use crate::workflow::registry::StepRegistry;
use crate::workflow::step::{RetryPolicy, StepDefinition, StepId};

/// The built-in steps in registration order, with default settings.
pub fn builtin_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(StepId::FetchIssue)
            .describe("Load the issue description from the work queue")
            .produces([A::Issue]),
        StepDefinition::new(StepId::Classify)
            .describe("Classify the issue type and complexity")
            .requires([A::Issue])
            .produces([A::Classification]),
        StepDefinition::new(StepId::Plan)
            .describe("Build an implementation plan")
            .requires([A::Issue, A::Classification])
            .produces([A::Plan]),
        StepDefinition::new(StepId::Implement)
            .describe("Implement the plan")
            .requires([A::Plan])
            .produces([A::Implementation]),
        StepDefinition::new(StepId::Review)
            .describe("Review the implementation against the plan")
            .requires([A::Plan, A::Implementation])
            .produces([A::Review])
            .best_effort(),
        StepDefinition::new(StepId::AddressReview)
            .describe("Address the issues raised in review")
            .requires([A::Review])
            .produces([A::ReviewAddressed])
            .best_effort(),
        StepDefinition::new(StepId::CodeQuality)
            .describe("Run code quality checks (linting, type checking)")
            .requires([A::Implementation])
            .produces([A::QualityCheck])
            .best_effort(),
        StepDefinition::new(StepId::ValidateAcceptance)
            .describe("Validate the implementation against the plan's acceptance criteria")
            .requires([A::Plan, A::Implementation])
            .produces([A::Acceptance])
            .best_effort(),
        StepDefinition::new(StepId::FetchPatch)
            .describe("Load the patch request from the work queue")
            .produces([A::Patch]),
        StepDefinition::new(StepId::PatchPlan)
            .describe("Plan the requested patch against the original plan")
            .requires([A::Issue, A::Patch, A::Plan])
            .produces([A::PatchPlan]),
        StepDefinition::new(StepId::PatchImplement)
            .describe("Implement the patch plan")
            .requires([A::PatchPlan])
            .produces([A::PatchImplementation]),
    ]
}

/// Build and validate the default registry, applying retry and timeout
/// settings from configuration.
pub fn default_registry(config: &RougeToml) -> Result<StepRegistry, RegistryError> {
    let mut registry = StepRegistry::new();
    for step in builtin_steps() {
        let settings = config.step_settings(step.id.as_str());
        registry.register(
            step.with_retry(RetryPolicy::exponential(settings.max_retries))
                .with_timeout(settings.timeout),
        )?;
    }
    registry.validate()?;
    Ok(registry)
}
