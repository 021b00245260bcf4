//! Filesystem-backed artifact store.
//!
//! Layout under the data directory:
//!
//! ```text
//! workflows/
//!   <workflow_id>/
//!     issue.json
//!     classification.json
//!     ...
//!     workflow.json
//!     execution.log
//! ```
//!
//! Every artifact file is written to a uniquely named staging file in the same
//! directory and then renamed over the target, so readers observe either the
//! previous artifact or the new one and never a partial write.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ArtifactError;
use crate::workflow::step::StepId;

/// Closed vocabulary of artifact types exchanged between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Issue,
    Classification,
    Plan,
    Implementation,
    Review,
    ReviewAddressed,
    QualityCheck,
    Acceptance,
    Patch,
    PatchPlan,
    PatchImplementation,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 11] = [
        ArtifactType::Issue,
        ArtifactType::Classification,
        ArtifactType::Plan,
        ArtifactType::Implementation,
        ArtifactType::Review,
        ArtifactType::ReviewAddressed,
        ArtifactType::QualityCheck,
        ArtifactType::Acceptance,
        ArtifactType::Patch,
        ArtifactType::PatchPlan,
        ArtifactType::PatchImplementation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Classification => "classification",
            Self::Plan => "plan",
            Self::Implementation => "implementation",
            Self::Review => "review",
            Self::ReviewAddressed => "review_addressed",
            Self::QualityCheck => "quality_check",
            Self::Acceptance => "acceptance",
            Self::Patch => "patch",
            Self::PatchPlan => "patch_plan",
            Self::PatchImplementation => "patch_implementation",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        // Accept the legacy name for the raw issue artifact.
        let normalized = if normalized == "fetched_issue" {
            "issue".to_string()
        } else {
            normalized
        };
        ArtifactType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ArtifactError::UnknownType(s.to_string()))
    }
}

/// On-disk envelope around an artifact payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub workflow_id: String,
    pub artifact_type: ArtifactType,
    pub produced_by: Option<StepId>,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
}

/// File metadata reported by `artifact list`.
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub artifact_type: ArtifactType,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `data_dir`; workflows live in `data_dir/workflows`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into().join("workflows"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every file of one workflow.
    pub fn path_for(&self, workflow_id: &str) -> Result<PathBuf, ArtifactError> {
        validate_workflow_id(workflow_id)?;
        Ok(self.root.join(workflow_id))
    }

    fn artifact_path(&self, workflow_id: &str, artifact: ArtifactType) -> Result<PathBuf, ArtifactError> {
        Ok(self.path_for(workflow_id)?.join(artifact.file_name()))
    }

    /// Persist `payload` as the current artifact of this type, replacing any previous one.
    pub fn put(
        &self,
        workflow_id: &str,
        artifact: ArtifactType,
        produced_by: Option<StepId>,
        payload: &Value,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.path_for(workflow_id)?;
        fs::create_dir_all(&dir).map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;

        let envelope = Artifact {
            workflow_id: workflow_id.to_string(),
            artifact_type: artifact,
            produced_by,
            created_at: Utc::now(),
            payload: payload.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)
            .map_err(|source| ArtifactError::Serialization { artifact, source })?;

        let target = dir.join(artifact.file_name());
        let staging = dir.join(format!(".{}.{}.tmp", artifact.file_name(), uuid::Uuid::new_v4()));
        write_atomic(&staging, &target, &bytes)?;

        tracing::debug!(workflow_id, artifact = %artifact, path = %target.display(), "Artifact published");
        Ok(target)
    }

    /// Load the full envelope of an artifact.
    pub fn get_artifact(&self, workflow_id: &str, artifact: ArtifactType) -> Result<Artifact, ArtifactError> {
        let path = self.artifact_path(workflow_id, artifact)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound {
                    workflow_id: workflow_id.to_string(),
                    artifact,
                });
            }
            Err(source) => return Err(ArtifactError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| ArtifactError::Serialization { artifact, source })
    }

    /// Load only the payload of an artifact.
    pub fn get(&self, workflow_id: &str, artifact: ArtifactType) -> Result<Value, ArtifactError> {
        Ok(self.get_artifact(workflow_id, artifact)?.payload)
    }

    pub fn exists(&self, workflow_id: &str, artifact: ArtifactType) -> bool {
        self.artifact_path(workflow_id, artifact)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Artifact types currently present for a workflow.
    pub fn list(&self, workflow_id: &str) -> Result<BTreeSet<ArtifactType>, ArtifactError> {
        let dir = self.path_for(workflow_id)?;
        Ok(ArtifactType::ALL
            .into_iter()
            .filter(|t| dir.join(t.file_name()).is_file())
            .collect())
    }

    pub fn info(&self, workflow_id: &str, artifact: ArtifactType) -> Result<ArtifactInfo, ArtifactError> {
        let path = self.artifact_path(workflow_id, artifact)?;
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound {
                    workflow_id: workflow_id.to_string(),
                    artifact,
                });
            }
            Err(source) => return Err(ArtifactError::Io { path, source }),
        };
        Ok(ArtifactInfo {
            artifact_type: artifact,
            size_bytes: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            path,
        })
    }

    /// Remove an artifact. Absent artifacts are ignored.
    pub fn delete(&self, workflow_id: &str, artifact: ArtifactType) -> Result<bool, ArtifactError> {
        let path = self.artifact_path(workflow_id, artifact)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ArtifactError::Io { path, source }),
        }
    }

    /// Workflow ids that have a directory in the store, sorted.
    pub fn workflows(&self) -> Result<Vec<String>, ArtifactError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ArtifactError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Copy every artifact of `from` into `to`, re-stamping the workflow id.
    /// Returns the copied types.
    pub fn copy_workflow(&self, from: &str, to: &str) -> Result<Vec<ArtifactType>, ArtifactError> {
        let mut copied = Vec::new();
        for artifact in self.list(from)? {
            let original = self.get_artifact(from, artifact)?;
            self.put(to, artifact, original.produced_by, &original.payload)?;
            copied.push(artifact);
        }
        Ok(copied)
    }
}

/// Write `bytes` to `staging` and rename it over `target`.
pub(crate) fn write_atomic(staging: &Path, target: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    use std::io::Write;

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ArtifactError::Io { path, source }
    };

    let result = (|| {
        let mut file = fs::File::create(staging).map_err(io_err(staging))?;
        file.write_all(bytes).map_err(io_err(staging))?;
        file.sync_all().map_err(io_err(staging))?;
        fs::rename(staging, target).map_err(io_err(target))
    })();

    if result.is_err() {
        let _ = fs::remove_file(staging);
    }
    result
}

/// Workflow ids name a single directory; separators and parent references are rejected.
pub fn validate_workflow_id(workflow_id: &str) -> Result<(), ArtifactError> {
    let invalid = workflow_id.is_empty()
        || workflow_id == "."
        || workflow_id.contains("..")
        || workflow_id.starts_with('.')
        || workflow_id.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if invalid {
        return Err(ArtifactError::InvalidWorkflowId(workflow_id.to_string()));
    }
    Ok(())
}
