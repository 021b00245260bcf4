use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{AgentProvider, AgentRequest, ArtifactMap};
use crate::errors::StepExecutionError;
use crate::queue::{QueueItem, WorkQueue};
use crate::workflow::{ArtifactType, StepId};

/// Serves the fetch steps straight from the work queue, no agent involved.
///
/// `issue` is the issue being worked on; for a patch request that is the
/// parent issue, not the request row. `patch` is the request row itself and
/// only exists for rows created as patches.
pub struct StoreFetchProvider {
    queue: Arc<dyn WorkQueue>,
}

impl StoreFetchProvider {
    pub const NAME: &'static str = "store";

    pub fn new(queue: Arc<dyn WorkQueue>) -> Self {
        Self { queue }
    }

    async fn load(&self, step: StepId, item_id: i64) -> Result<QueueItem, StepExecutionError> {
        let item = self
            .queue
            .get_item(item_id)
            .await
            .map_err(|e| StepExecutionError::recoverable(step, e.to_string()))?
            .ok_or_else(|| StepExecutionError::fatal(step, format!("issue {} not found in the work queue", item_id)))?;

        if item.description.trim().is_empty() {
            return Err(StepExecutionError::fatal(
                step,
                format!("issue {} has an empty description", item.item_id),
            ));
        }
        Ok(item)
    }
}

#[async_trait]
impl AgentProvider for StoreFetchProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<ArtifactMap, StepExecutionError> {
        let step = request.step;
        let item = self.load(step, request.issue_id).await?;

        let mut out = ArtifactMap::new();
        for &artifact in &request.produces {
            let payload = match artifact {
                ArtifactType::Issue => {
                    let issue = match item.parent_id {
                        Some(parent) => self.load(step, parent).await?,
                        None => item.clone(),
                    };
                    json!({
                        "issue_id": issue.item_id,
                        "description": issue.description,
                        "status": issue.status,
                        "assigned_to": issue.assigned_to,
                        "created_at": issue.created_at,
                    })
                }
                ArtifactType::Patch => {
                    let Some(parent) = item.parent_id else {
                        return Err(StepExecutionError::fatal(
                            step,
                            format!("issue {} is not a patch request", item.item_id),
                        ));
                    };
                    json!({
                        "issue_id": parent,
                        "patch_id": item.item_id,
                        "patch_request": item.description,
                        "created_at": item.created_at,
                    })
                }
                other => {
                    return Err(StepExecutionError::fatal(
                        step,
                        format!("the work queue cannot provide '{}'", other),
                    ));
                }
            };
            out.insert(artifact, payload);
        }
        Ok(out)
    }
}
