//! Worker daemon (`rouge worker`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::watch;

use rouge::queue::WorkerId;
use rouge::rouge_config::RougeConfig;
use rouge::worker::{Worker, WorkerConfig};

pub async fn cmd_worker(
    config: &RougeConfig,
    worker_id: &str,
    poll_interval: Option<u64>,
    workflow_timeout: Option<u64>,
    working_dir: Option<PathBuf>,
) -> Result<()> {
    let worker_id: WorkerId = worker_id.parse().map_err(|e: String| anyhow!(e))?;
    let working_dir = working_dir
        .map(|dir| dir.canonicalize().with_context(|| format!("Invalid working directory: {}", dir.display())))
        .transpose()?;

    let worker_config = WorkerConfig::from_config(
        config,
        worker_id,
        poll_interval.map(Duration::from_secs),
        workflow_timeout.map(Duration::from_secs),
        working_dir,
    )?;

    if let Some(dir) = &worker_config.working_dir {
        tracing::info!(working_dir = %dir.display(), "Working directory set");
    }

    let queue = super::connect_queue(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown requested, finishing current work");
        let _ = shutdown_tx.send(true);
    });

    let mut worker = Worker::new(worker_config, queue);
    worker.run(shutdown_rx).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
