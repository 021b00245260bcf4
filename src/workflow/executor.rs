//! Pipeline executor: runs one workflow instance step by step.
//!
//! Steps run in the order the registry resolves for the targets. A step
//! whose outputs are all already stored is skipped, so re-running a
//! workflow id only redoes what is missing. Each provider call is bounded by
//! the step's timeout; recoverable failures are retried per the step's
//! retry policy. A critical step failure fails the whole run; a best-effort
//! step failure is recorded and the run continues without its outputs.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agents::{AgentProvider, AgentRequest, ArtifactMap, ProviderRegistry};
use crate::errors::{ArtifactError, PipelineError, StepExecutionError};
use crate::workflow::artifacts::{ArtifactStore, ArtifactType, validate_workflow_id};
use crate::workflow::instance::{WorkflowInstance, WorkflowStatus};
use crate::workflow::log::{ExecutionLog, LogEvent};
use crate::workflow::registry::StepRegistry;
use crate::workflow::step::{StepDefinition, StepId};

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunReport {
    pub instance: WorkflowInstance,
    /// Steps whose provider was invoked and whose outputs were stored.
    pub executed: Vec<StepId>,
    /// Steps not executed because their outputs existed or an input was unavailable.
    pub skipped: Vec<StepId>,
    /// Best-effort step failures that did not fail the run.
    pub failures: Vec<StepExecutionError>,
}

pub struct PipelineExecutor {
    registry: Arc<StepRegistry>,
    store: ArtifactStore,
    providers: ProviderRegistry,
    working_dir: Option<PathBuf>,
}

impl PipelineExecutor {
    pub fn new(registry: Arc<StepRegistry>, store: ArtifactStore, providers: ProviderRegistry) -> Self {
        Self {
            registry,
            store,
            providers,
            working_dir: None,
        }
    }

    /// Directory agents run in (the repository being changed).
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run the targets (and everything they depend on) for one workflow.
    pub async fn run(
        &self,
        workflow_id: &str,
        issue_id: i64,
        targets: &[StepId],
    ) -> Result<RunReport, PipelineError> {
        validate_workflow_id(workflow_id)?;

        let mut instance = match WorkflowInstance::load(&self.store, workflow_id)? {
            Some(existing) => {
                if existing.status == WorkflowStatus::Failed {
                    return Err(PipelineError::WorkflowFailed(workflow_id.to_string()));
                }
                if existing.issue_id != issue_id {
                    tracing::warn!(
                        workflow_id,
                        stored_issue_id = existing.issue_id,
                        issue_id,
                        "Workflow was started for a different issue"
                    );
                }
                existing
            }
            None => WorkflowInstance::new(workflow_id, issue_id),
        };

        let order = self.registry.resolve_order(targets)?;

        instance.transition(WorkflowStatus::Running)?;
        instance.save(&self.store)?;

        let log = ExecutionLog::new(self.store.path_for(workflow_id)?);
        let order_names: Vec<&str> = order.iter().map(StepId::as_str).collect();
        log.record(LogEvent::RunStarted, None, None, Some(&order_names.join(",")));
        tracing::info!(workflow_id, issue_id, steps = %order_names.join(" -> "), "Workflow run started");

        let mut report = RunReport {
            instance: instance.clone(),
            executed: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        };

        match self.execute_steps(workflow_id, issue_id, &order, &log, &mut report).await {
            Ok(()) => {
                instance.transition(WorkflowStatus::Completed)?;
                instance.save(&self.store)?;
                log.record(LogEvent::RunCompleted, None, None, None);
                tracing::info!(
                    workflow_id,
                    executed = report.executed.len(),
                    skipped = report.skipped.len(),
                    "Workflow run completed"
                );
                report.instance = instance;
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                instance.fail(&message)?;
                if let Err(save_err) = instance.save(&self.store) {
                    tracing::warn!(workflow_id, error = %save_err, "Failed to record workflow failure");
                }
                log.record(LogEvent::RunFailed, None, None, Some(&message));
                tracing::error!(workflow_id, error = %message, "Workflow run failed");
                Err(e)
            }
        }
    }

    async fn execute_steps(
        &self,
        workflow_id: &str,
        issue_id: i64,
        order: &[StepId],
        log: &ExecutionLog,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        // Outputs of best-effort steps that failed in this run.
        let mut unavailable: BTreeSet<ArtifactType> = BTreeSet::new();
        // Outputs written in this run; anything built from them is stale.
        let mut regenerated: BTreeSet<ArtifactType> = BTreeSet::new();

        for &step_id in order {
            let step = self.registry.step(step_id)?;

            let stale_input = step.requires.iter().find(|t| regenerated.contains(*t));
            if let Some(input) = stale_input {
                tracing::debug!(workflow_id, step = %step_id, input = %input, "Input regenerated, re-running");
            }

            if stale_input.is_none()
                && !step.produces.is_empty()
                && step.produces.iter().all(|t| self.store.exists(workflow_id, *t))
            {
                tracing::info!(workflow_id, step = %step_id, "Outputs already present, skipping");
                log.record(LogEvent::StepSkipped, Some(step_id), None, Some("outputs present"));
                report.skipped.push(step_id);
                continue;
            }

            if let Some(missing) = step.requires.iter().find(|t| unavailable.contains(*t)) {
                let detail = format!("input '{}' unavailable", missing);
                tracing::warn!(workflow_id, step = %step_id, reason = %detail, "Skipping step");
                log.record(LogEvent::StepSkipped, Some(step_id), None, Some(&detail));
                report.skipped.push(step_id);
                unavailable.extend(step.produces.iter().copied());
                continue;
            }

            match self.execute_step(workflow_id, issue_id, step, log).await {
                Ok(_) => {
                    regenerated.extend(step.produces.iter().copied());
                    report.executed.push(step_id);
                }
                Err(PipelineError::Step(e)) if !step.critical => {
                    tracing::warn!(workflow_id, step = %step_id, error = %e, "Best-effort step failed, continuing");
                    unavailable.extend(step.produces.iter().copied());
                    report.failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Run exactly one step, regardless of whether its outputs exist.
    ///
    /// Its inputs must already be stored; the workflow record is left untouched.
    pub async fn run_step(
        &self,
        workflow_id: &str,
        issue_id: i64,
        step_id: StepId,
    ) -> Result<Vec<ArtifactType>, PipelineError> {
        let step = self.registry.step(step_id)?;
        let log = ExecutionLog::new(self.store.path_for(workflow_id)?);
        self.execute_step(workflow_id, issue_id, step, &log).await
    }

    async fn execute_step(
        &self,
        workflow_id: &str,
        issue_id: i64,
        step: &StepDefinition,
        log: &ExecutionLog,
    ) -> Result<Vec<ArtifactType>, PipelineError> {
        let inputs = self.gather_inputs(workflow_id, step)?;
        let provider = self.providers.provider_for(step.id)?;

        let request = AgentRequest {
            workflow_id: workflow_id.to_string(),
            issue_id,
            step: step.id,
            description: step.description.clone(),
            inputs,
            produces: step.produces.iter().copied().collect(),
            working_dir: self.working_dir.clone(),
        };

        let outputs = self.invoke_with_retry(provider.as_ref(), step, &request, log).await?;
        let stored = self.persist_outputs(workflow_id, step, outputs)?;

        log.record(LogEvent::StepSucceeded, Some(step.id), None, None);
        tracing::info!(workflow_id, step = %step.id, "Step succeeded");
        Ok(stored)
    }

    fn gather_inputs(&self, workflow_id: &str, step: &StepDefinition) -> Result<ArtifactMap, PipelineError> {
        let mut inputs = ArtifactMap::new();
        for &artifact in &step.requires {
            match self.store.get(workflow_id, artifact) {
                Ok(payload) => {
                    inputs.insert(artifact, payload);
                }
                Err(ArtifactError::NotFound { .. }) => {
                    return Err(PipelineError::MissingProducerOutput {
                        step: step.id,
                        artifact,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(inputs)
    }

    async fn invoke_with_retry(
        &self,
        provider: &dyn AgentProvider,
        step: &StepDefinition,
        request: &AgentRequest,
        log: &ExecutionLog,
    ) -> Result<ArtifactMap, StepExecutionError> {
        let mut attempt = 1u32;
        loop {
            log.record(LogEvent::StepStarted, Some(step.id), Some(attempt), Some(provider.name()));
            tracing::info!(
                workflow_id = %request.workflow_id,
                step = %step.id,
                attempt,
                provider = provider.name(),
                "Running step"
            );

            let result = match tokio::time::timeout(step.timeout, provider.invoke(request)).await {
                Ok(result) => result,
                Err(_) => Err(StepExecutionError::Timeout {
                    step: step.id,
                    timeout: step.timeout,
                }),
            };

            let err = match result {
                Ok(outputs) => return Ok(outputs),
                Err(e) => e,
            };

            if err.is_recoverable()
                && let Some(delay) = step.retry.delay_for_retry(attempt)
            {
                tracing::warn!(
                    step = %step.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Recoverable step failure, retrying"
                );
                log.record(LogEvent::StepRetry, Some(step.id), Some(attempt), Some(&err.to_string()));
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let err = if err.is_recoverable() {
                StepExecutionError::fatal(step.id, format!("gave up after {} attempt(s): {}", attempt, err))
            } else {
                err
            };
            log.record(LogEvent::StepFailed, Some(step.id), Some(attempt), Some(&err.to_string()));
            return Err(err);
        }
    }

    fn persist_outputs(
        &self,
        workflow_id: &str,
        step: &StepDefinition,
        mut outputs: ArtifactMap,
    ) -> Result<Vec<ArtifactType>, PipelineError> {
        // Check the whole contract before publishing anything.
        if let Some(missing) = step.produces.iter().find(|t| !outputs.contains_key(*t)) {
            return Err(StepExecutionError::fatal(
                step.id,
                format!("provider returned no '{}' artifact", missing),
            )
            .into());
        }
        let extra: Vec<ArtifactType> = outputs
            .keys()
            .filter(|t| !step.produces.contains(*t))
            .copied()
            .collect();
        if !extra.is_empty() {
            tracing::warn!(step = %step.id, extra = ?extra, "Ignoring undeclared step outputs");
        }

        let mut stored = Vec::with_capacity(step.produces.len());
        for &artifact in &step.produces {
            if let Some(payload) = outputs.remove(&artifact) {
                self.put_with_retry(workflow_id, step.id, artifact, &payload)?;
                stored.push(artifact);
            }
        }
        Ok(stored)
    }

    /// Serialization failures are retried once before they fail the step.
    fn put_with_retry(
        &self,
        workflow_id: &str,
        step: StepId,
        artifact: ArtifactType,
        payload: &serde_json::Value,
    ) -> Result<(), ArtifactError> {
        match self.store.put(workflow_id, artifact, Some(step), payload) {
            Err(ArtifactError::Serialization { source, .. }) => {
                tracing::warn!(workflow_id, artifact = %artifact, error = %source, "Retrying artifact write");
                self.store.put(workflow_id, artifact, Some(step), payload).map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }
}
