//! Typed error hierarchy for the Rouge workflow engine.
//!
//! One enum per subsystem:
//! - `RegistryError`: step registration and graph validation (fatal at startup)
//! - `ArtifactError`: artifact persistence
//! - `StepExecutionError`: a single step invocation against an agent provider
//! - `ClaimError`: backing-store access from the work queue
//! - `PipelineError`: run-level failures of the pipeline executor

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::workflow::{ArtifactType, StepId, WorkflowStatus};

/// Errors from building or validating the step registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Step '{0}' is already registered")]
    DuplicateStep(StepId),

    #[error("Step '{step}' references undeclared artifact type '{artifact}'")]
    UnknownArtifactType { step: String, artifact: String },

    #[error("Artifact '{artifact}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        artifact: ArtifactType,
        first: StepId,
        second: StepId,
    },

    #[error("Cycle detected in step dependencies. Involved steps: {}", join_steps(.steps))]
    Cycle { steps: Vec<StepId> },

    #[error("Step '{step}' requires artifact '{artifact}' but no step produces it")]
    MissingProducer { step: StepId, artifact: ArtifactType },

    #[error("Unknown step '{0}'")]
    UnknownStep(String),
}

fn join_steps(steps: &[StepId]) -> String {
    steps
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from the filesystem-backed artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact '{artifact}' not found for workflow '{workflow_id}'")]
    NotFound {
        workflow_id: String,
        artifact: ArtifactType,
    },

    #[error("Failed to (de)serialize artifact '{artifact}': {source}")]
    Serialization {
        artifact: ArtifactType,
        #[source]
        source: serde_json::Error,
    },

    #[error("Artifact I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid workflow id '{0}'")]
    InvalidWorkflowId(String),

    #[error("Unknown artifact type '{0}'")]
    UnknownType(String),
}

/// Errors from invoking one step through its agent provider.
#[derive(Debug, Error)]
pub enum StepExecutionError {
    /// Transient provider failure; retried per the step's policy.
    #[error("Recoverable failure in step '{step}': {message}")]
    Recoverable { step: StepId, message: String },

    /// Non-retryable failure; aborts the workflow run.
    #[error("Fatal failure in step '{step}': {message}")]
    Fatal { step: StepId, message: String },

    #[error("Step '{step}' exceeded its timeout of {}s", .timeout.as_secs())]
    Timeout { step: StepId, timeout: Duration },
}

impl StepExecutionError {
    pub fn recoverable(step: StepId, message: impl Into<String>) -> Self {
        Self::Recoverable {
            step,
            message: message.into(),
        }
    }

    pub fn fatal(step: StepId, message: impl Into<String>) -> Self {
        Self::Fatal {
            step,
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }

    pub fn step(&self) -> StepId {
        match self {
            Self::Recoverable { step, .. } | Self::Fatal { step, .. } | Self::Timeout { step, .. } => {
                *step
            }
        }
    }
}

/// Errors from the backing relational store behind the work queue.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid row in backing store: {0}")]
    InvalidRow(String),

    #[error("Item {0} not found")]
    ItemNotFound(i64),
}

impl From<rusqlite::Error> for ClaimError {
    fn from(err: rusqlite::Error) -> Self {
        ClaimError::Unavailable(err.to_string())
    }
}

impl From<sqlx::Error> for ClaimError {
    fn from(err: sqlx::Error) -> Self {
        ClaimError::Unavailable(err.to_string())
    }
}

/// Run-level errors from the pipeline executor.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Step(#[from] StepExecutionError),

    /// A required artifact is absent although its producer is part of the run.
    #[error("Step '{step}' requires '{artifact}' but it was never persisted")]
    MissingProducerOutput { step: StepId, artifact: ArtifactType },

    #[error("Workflow '{0}' has failed and cannot be resumed; start a new workflow id")]
    WorkflowFailed(String),

    #[error("Invalid workflow status transition {from} -> {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("No agent provider configured for step '{0}'")]
    NoProvider(StepId),
}
