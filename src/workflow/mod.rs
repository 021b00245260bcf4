//! The workflow engine: step declarations, the artifact store, and the
//! executor that runs steps in dependency order.

pub mod artifacts;
pub mod defaults;
pub mod executor;
pub mod instance;
pub mod log;
pub mod registry;
pub mod step;

pub use artifacts::{Artifact, ArtifactInfo, ArtifactStore, ArtifactType, validate_workflow_id};
pub use defaults::{builtin_steps, default_registry};
pub use executor::{PipelineExecutor, RunReport};
pub use instance::{WorkflowInstance, WorkflowStatus};
pub use log::{ExecutionLog, LogEntry, LogEvent};
pub use registry::StepRegistry;
pub use step::{RetryPolicy, StepDefinition, StepId};
