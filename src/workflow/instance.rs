//! Workflow instance record (`workflow.json`) and its status machine.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ArtifactError, PipelineError};
use crate::workflow::artifacts::{ArtifactStore, ArtifactType, write_atomic};

const INSTANCE_FILE: &str = "workflow.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// `Failed` is terminal. A `Running` record may be picked up again after
    /// a crash, and a `Completed` one may be re-run after an artifact is deleted.
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Completed, Running)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub workflow_id: String,
    pub issue_id: i64,
    pub status: WorkflowStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowInstance {
    pub fn new(workflow_id: &str, issue_id: i64) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            issue_id,
            status: WorkflowStatus::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn transition(&mut self, next: WorkflowStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        match next {
            WorkflowStatus::Running => {
                self.started_at = Some(now);
                self.finished_at = None;
                self.error = None;
            }
            WorkflowStatus::Completed | WorkflowStatus::Failed => self.finished_at = Some(now),
            WorkflowStatus::Pending => {}
        }
        self.status = next;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), PipelineError> {
        self.transition(WorkflowStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    fn path(store: &ArtifactStore, workflow_id: &str) -> Result<PathBuf, ArtifactError> {
        Ok(store.path_for(workflow_id)?.join(INSTANCE_FILE))
    }

    /// Load the record for a workflow, if one was ever saved.
    pub fn load(store: &ArtifactStore, workflow_id: &str) -> Result<Option<Self>, ArtifactError> {
        let path = Self::path(store, workflow_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ArtifactError::Io { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ArtifactError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })
    }

    /// Most recently finished completed main-pipeline workflow for an issue.
    /// Workflows holding a `patch` artifact are patch runs and are ignored.
    pub fn latest_completed(store: &ArtifactStore, issue_id: i64) -> Result<Option<Self>, ArtifactError> {
        let mut latest: Option<Self> = None;
        for workflow_id in store.workflows()? {
            let Some(instance) = Self::load(store, &workflow_id)? else {
                continue;
            };
            if instance.issue_id != issue_id
                || instance.status != WorkflowStatus::Completed
                || store.exists(&workflow_id, ArtifactType::Patch)
            {
                continue;
            }
            if latest.as_ref().is_none_or(|l| instance.finished_at > l.finished_at) {
                latest = Some(instance);
            }
        }
        Ok(latest)
    }

    pub fn save(&self, store: &ArtifactStore) -> Result<(), ArtifactError> {
        let dir = store.path_for(&self.workflow_id)?;
        fs::create_dir_all(&dir).map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| ArtifactError::Io {
            path: dir.join(INSTANCE_FILE),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        let staging = dir.join(format!(".{}.{}.tmp", INSTANCE_FILE, uuid::Uuid::new_v4()));
        write_atomic(&staging, &dir.join(INSTANCE_FILE), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowStatus::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Running));
    }

    #[test]
    fn test_failed_is_terminal() {
        for next in [Pending, Running, Completed, Failed] {
            assert!(!Failed.can_transition_to(next));
        }
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn test_transition_sets_timestamps() {
        let mut wf = WorkflowInstance::new("wf-1", 42);
        wf.transition(Running).unwrap();
        assert!(wf.started_at.is_some());
        assert!(wf.finished_at.is_none());
        wf.fail("boom").unwrap();
        assert_eq!(wf.status, Failed);
        assert!(wf.finished_at.is_some());
        assert_eq!(wf.error.as_deref(), Some("boom"));

        let err = wf.transition(Running).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { from: Failed, to: Running }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(WorkflowInstance::load(&store, "wf-1").unwrap().is_none());

        let mut wf = WorkflowInstance::new("wf-1", 7);
        wf.transition(Running).unwrap();
        wf.save(&store).unwrap();

        let loaded = WorkflowInstance::load(&store, "wf-1").unwrap().unwrap();
        assert_eq!(loaded, wf);
        // The instance record is not an artifact.
        assert!(store.list("wf-1").unwrap().is_empty());
    }

    #[test]
    fn test_latest_completed_ignores_patch_and_failed_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let finish = |id: &str, issue: i64, ok: bool| {
            let mut wf = WorkflowInstance::new(id, issue);
            wf.transition(Running).unwrap();
            if ok {
                wf.transition(Completed).unwrap();
            } else {
                wf.fail("boom").unwrap();
            }
            wf.save(&store).unwrap();
        };
        finish("aaa", 5, true);
        finish("bbb", 5, true);
        finish("ccc", 5, false);
        finish("ddd", 6, true);
        finish("bbb-patch", 5, true);
        store
            .put("bbb-patch", ArtifactType::Patch, None, &serde_json::json!({"patch_request": "x"}))
            .unwrap();

        let latest = WorkflowInstance::latest_completed(&store, 5).unwrap().unwrap();
        assert_eq!(latest.workflow_id, "bbb");
        assert!(WorkflowInstance::latest_completed(&store, 9).unwrap().is_none());
    }
}
