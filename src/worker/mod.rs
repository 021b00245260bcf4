//! Worker daemon: poll the queue, run one pipeline at a time, record the outcome.
//!
//! ```text
//! idle --(poll interval)--> claiming --(hit)--> running_pipeline --> idle
//!                              |
//!                              +--(miss / claim error)--> idle
//! ```
//!
//! A shutdown signal moves the worker to `stopping`: an in-flight pipeline
//! is allowed to finish, no new work is claimed.

pub mod config;
pub mod launcher;

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::queue::{ClaimedItem, ItemStatus, WorkQueue};
use crate::util::make_workflow_id;

pub use config::{WorkerConfig, load_env_file, resolve_pipeline_command};
pub use launcher::{LaunchOutcome, SubprocessLauncher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Claiming,
    RunningPipeline,
    Stopping,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Claiming => "claiming",
            Self::RunningPipeline => "running_pipeline",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// What one claim attempt led to.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Nothing claimable for this worker.
    Empty,
    /// The store could not be reached; retried on the next poll.
    ClaimFailed(String),
    Processed {
        item_id: i64,
        workflow_id: String,
        outcome: LaunchOutcome,
        status: ItemStatus,
    },
}

pub struct Worker {
    config: WorkerConfig,
    queue: Arc<dyn WorkQueue>,
    launcher: SubprocessLauncher,
    state: WorkerState,
}

impl Worker {
    pub fn new(config: WorkerConfig, queue: Arc<dyn WorkQueue>) -> Self {
        let launcher = SubprocessLauncher::new(
            config.pipeline_command.clone(),
            config.data_dir.clone(),
            config.working_dir.clone(),
            config.workflow_timeout,
        );
        Self {
            config,
            queue,
            launcher,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Main loop. Returns once `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// Each cycle starts idle: the worker waits one poll interval before it
    /// claims, so a restart loop cannot hammer the queue.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            backend = self.queue.backend(),
            poll_interval_secs = self.config.poll_interval.as_secs(),
            workflow_timeout_secs = self.config.workflow_timeout.as_secs(),
            "Worker starting"
        );

        loop {
            self.state = WorkerState::Idle;
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
            self.poll_once().await;
        }

        self.state = WorkerState::Stopping;
        tracing::info!(worker_id = %self.config.worker_id, "Worker stopped");
    }

    /// One claim attempt and, on a hit, one full pipeline run.
    pub async fn poll_once(&mut self) -> PollOutcome {
        self.state = WorkerState::Claiming;
        let claimed = match self.queue.claim_next(&self.config.worker_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::debug!(worker_id = %self.config.worker_id, "No pending issues");
                return PollOutcome::Empty;
            }
            Err(e) => {
                tracing::warn!(
                    worker_id = %self.config.worker_id,
                    error = %e,
                    "Claim failed, will retry on next poll"
                );
                return PollOutcome::ClaimFailed(e.to_string());
            }
        };

        self.state = WorkerState::RunningPipeline;
        self.process(claimed).await
    }

    async fn process(&self, item: ClaimedItem) -> PollOutcome {
        let workflow_id = make_workflow_id();
        let patch = item.is_patch();
        tracing::info!(
            worker_id = %self.config.worker_id,
            issue_id = item.item_id,
            workflow_id = %workflow_id,
            prior_status = %item.prior_status,
            "Claimed issue"
        );

        let outcome = self.launcher.launch(item.item_id, &workflow_id, patch).await;
        let status = match &outcome {
            LaunchOutcome::Succeeded if patch => ItemStatus::Patched,
            LaunchOutcome::Succeeded => ItemStatus::Completed,
            _ => ItemStatus::Failed,
        };

        match &outcome {
            LaunchOutcome::Succeeded => {
                tracing::info!(issue_id = item.item_id, workflow_id = %workflow_id, "Workflow succeeded");
            }
            LaunchOutcome::Failed { exit_code } => {
                tracing::error!(
                    issue_id = item.item_id,
                    workflow_id = %workflow_id,
                    exit_code = ?exit_code,
                    "Workflow failed"
                );
            }
            LaunchOutcome::TimedOut => {
                tracing::error!(
                    issue_id = item.item_id,
                    workflow_id = %workflow_id,
                    timeout_secs = self.config.workflow_timeout.as_secs(),
                    "Workflow timed out and was terminated"
                );
            }
            LaunchOutcome::SpawnFailed(reason) => {
                tracing::error!(issue_id = item.item_id, error = %reason, "Could not start workflow");
            }
        }

        if let Err(e) = self.queue.update_status(item.item_id, status).await {
            tracing::error!(issue_id = item.item_id, status = %status, error = %e, "Failed to update issue status");
        }

        PollOutcome::Processed {
            item_id: item.item_id,
            workflow_id,
            outcome,
            status,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::errors::ClaimError;
    use crate::queue::{QueueItem, SqliteQueue, WorkerId};

    /// Sqlite queue whose first `failures` claims report the store as unreachable.
    struct FlakyQueue {
        inner: SqliteQueue,
        failures: usize,
        claims: AtomicUsize,
    }

    #[async_trait]
    impl WorkQueue for FlakyQueue {
        fn backend(&self) -> &'static str {
            "flaky"
        }

        async fn claim_next(&self, worker: &WorkerId) -> Result<Option<ClaimedItem>, ClaimError> {
            if self.claims.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(ClaimError::Unavailable("connection refused".into()));
            }
            self.inner.claim_next(worker).await
        }

        async fn update_status(&self, item_id: i64, status: ItemStatus) -> Result<(), ClaimError> {
            self.inner.update_status(item_id, status).await
        }

        async fn get_item(&self, item_id: i64) -> Result<Option<QueueItem>, ClaimError> {
            self.inner.get_item(item_id).await
        }

        async fn enqueue(
            &self,
            description: &str,
            assigned_to: Option<&WorkerId>,
            status: ItemStatus,
        ) -> Result<QueueItem, ClaimError> {
            self.inner.enqueue(description, assigned_to, status).await
        }

        async fn enqueue_patch(
            &self,
            parent_id: i64,
            description: &str,
            assigned_to: Option<&WorkerId>,
        ) -> Result<QueueItem, ClaimError> {
            self.inner.enqueue_patch(parent_id, description, assigned_to).await
        }

        async fn list_items(&self, limit: usize) -> Result<Vec<QueueItem>, ClaimError> {
            self.inner.list_items(limit).await
        }
    }

    fn worker_config(dir: &tempfile::TempDir, script: &str, timeout: Duration) -> WorkerConfig {
        WorkerConfig {
            worker_id: "alleycat-1".parse().unwrap(),
            poll_interval: Duration::from_millis(20),
            workflow_timeout: timeout,
            working_dir: None,
            data_dir: PathBuf::from(dir.path()),
            pipeline_command: vec!["sh".into(), "-c".into(), script.into()],
        }
    }

    async fn setup(script: &str, timeout: Duration) -> (tempfile::TempDir, Arc<dyn WorkQueue>, Worker) {
        let dir = tempfile::tempdir().unwrap();
        let queue: Arc<dyn WorkQueue> = Arc::new(SqliteQueue::open(&dir.path().join("q.db")).await.unwrap());
        let worker = Worker::new(worker_config(&dir, script, timeout), queue.clone());
        (dir, queue, worker)
    }

    fn me() -> WorkerId {
        "alleycat-1".parse().unwrap()
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let (_dir, _queue, mut worker) = setup("exit 0", Duration::from_secs(5)).await;
        assert_eq!(worker.poll_once().await, PollOutcome::Empty);
    }

    #[tokio::test]
    async fn test_success_marks_completed() {
        let (_dir, queue, mut worker) = setup("exit 0", Duration::from_secs(5)).await;
        let item = queue.enqueue("fix it", Some(&me()), ItemStatus::Pending).await.unwrap();

        let outcome = worker.poll_once().await;
        assert!(matches!(outcome, PollOutcome::Processed { status: ItemStatus::Completed, .. }));
        let stored = queue.get_item(item.item_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Completed);
    }

    #[tokio::test]
    async fn test_patch_success_marks_patched() {
        // The patch flag must reach the pipeline.
        let (_dir, queue, mut worker) = setup(r#"[ "$4" = --patch ]"#, Duration::from_secs(5)).await;
        let item = queue.enqueue("tweak", Some(&me()), ItemStatus::PatchPending).await.unwrap();

        worker.poll_once().await;
        let stored = queue.get_item(item.item_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Patched);
    }

    #[tokio::test]
    async fn test_failure_and_timeout_mark_failed() {
        let (_dir, queue, mut worker) = setup("exit 1", Duration::from_secs(5)).await;
        let item = queue.enqueue("a", Some(&me()), ItemStatus::Pending).await.unwrap();
        worker.poll_once().await;
        assert_eq!(queue.get_item(item.item_id).await.unwrap().unwrap().status, ItemStatus::Failed);

        let (_dir, queue, mut worker) = setup("sleep 30", Duration::from_millis(200)).await;
        let item = queue.enqueue("b", Some(&me()), ItemStatus::Pending).await.unwrap();
        let outcome = worker.poll_once().await;
        assert!(matches!(outcome, PollOutcome::Processed { outcome: LaunchOutcome::TimedOut, .. }));
        assert_eq!(queue.get_item(item.item_id).await.unwrap().unwrap().status, ItemStatus::Failed);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let (_dir, _queue, mut worker) = setup("exit 0", Duration::from_secs(5)).await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            worker.run(rx).await;
            worker.state()
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        let state = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert_eq!(state, WorkerState::Stopping);
    }

    #[tokio::test]
    async fn test_claim_error_is_retried_on_next_poll() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FlakyQueue {
            inner: SqliteQueue::open(&dir.path().join("q.db")).await.unwrap(),
            failures: 1,
            claims: AtomicUsize::new(0),
        });
        let item = queue.enqueue("fix it", Some(&me()), ItemStatus::Pending).await.unwrap();
        let mut worker = Worker::new(worker_config(&dir, "exit 0", Duration::from_secs(5)), queue.clone());

        let first = worker.poll_once().await;
        assert!(matches!(&first, PollOutcome::ClaimFailed(reason) if reason.contains("connection refused")));
        assert_eq!(queue.get_item(item.item_id).await.unwrap().unwrap().status, ItemStatus::Pending);

        let second = worker.poll_once().await;
        assert!(matches!(
            second,
            PollOutcome::Processed { item_id, status: ItemStatus::Completed, .. } if item_id == item.item_id
        ));
        assert_eq!(queue.claims.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loop_waits_one_interval_before_claiming() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FlakyQueue {
            inner: SqliteQueue::open(&dir.path().join("q.db")).await.unwrap(),
            failures: 0,
            claims: AtomicUsize::new(0),
        });
        let mut config = worker_config(&dir, "exit 0", Duration::from_secs(5));
        config.poll_interval = Duration::from_millis(500);
        let mut worker = Worker::new(config, queue.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(queue.claims.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(queue.claims.load(Ordering::SeqCst) >= 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
