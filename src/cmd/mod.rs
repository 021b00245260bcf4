//! CLI command implementations.
//!
//! | Module      | Commands handled |
//! |-------------|------------------|
//! | `step`      | `Step`           |
//! | `artifact`  | `Artifact`       |
//! | `run`       | `Run`            |
//! | `worker`    | `Worker`         |
//! | `queue`     | `Queue`          |
//! | `config`    | `Config`         |

pub mod artifact;
pub mod config;
pub mod queue;
pub mod run;
pub mod step;
pub mod worker;

pub use artifact::cmd_artifact;
pub use config::cmd_config;
pub use queue::cmd_queue;
pub use run::cmd_run;
pub use step::cmd_step;
pub use worker::cmd_worker;

use std::sync::Arc;

use anyhow::{Context, Result};

use rouge::agents::ProviderRegistry;
use rouge::queue::{WorkQueue, open_queue};
use rouge::rouge_config::RougeConfig;
use rouge::workflow::{ArtifactStore, PipelineExecutor, default_registry};

/// Work queue named by the configured database.
pub async fn connect_queue(config: &RougeConfig) -> Result<Arc<dyn WorkQueue>> {
    open_queue(config).await.context("Failed to open work queue")
}

/// Executor wired from configuration: default registry, data-dir store,
/// configured providers. Agents work in the current directory.
pub fn build_executor(config: &RougeConfig, queue: Arc<dyn WorkQueue>) -> Result<PipelineExecutor> {
    let registry = default_registry(&config.toml).context("Invalid step registry")?;
    let providers = ProviderRegistry::from_config(config, queue)?;
    let store = ArtifactStore::new(config.data_dir());
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Ok(PipelineExecutor::new(Arc::new(registry), store, providers).with_working_dir(cwd))
}
