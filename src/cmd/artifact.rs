//! Artifact inspection commands (`rouge artifact`).

use anyhow::{Context, Result};
use console::style;

use rouge::rouge_config::RougeConfig;
use rouge::workflow::{ArtifactStore, ArtifactType, WorkflowInstance};

use super::super::ArtifactCommands;

pub fn cmd_artifact(config: &RougeConfig, command: ArtifactCommands) -> Result<()> {
    let store = ArtifactStore::new(config.data_dir());

    match command {
        ArtifactCommands::List { workflow_id } => {
            let types = store.list(&workflow_id)?;
            if types.is_empty() {
                println!("No artifacts for workflow {}", workflow_id);
                return Ok(());
            }

            if let Some(instance) = WorkflowInstance::load(&store, &workflow_id)? {
                println!(
                    "Workflow {} (issue #{}): {}",
                    style(&workflow_id).bold(),
                    instance.issue_id,
                    instance.status
                );
            }
            println!();
            println!("{:<22} {:>10}  Modified", "Artifact", "Size");
            println!("{:<22} {:>10}  --------", "----------------------", "----------");
            for artifact in types {
                let info = store.info(&workflow_id, artifact)?;
                let modified = info
                    .modified
                    .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<22} {:>10}  {}", artifact.as_str(), info.size_bytes, modified);
            }
        }
        ArtifactCommands::Show {
            workflow_id,
            artifact_type,
            raw,
        } => {
            let artifact: ArtifactType = artifact_type.parse()?;
            let output = if raw {
                serde_json::to_string_pretty(&store.get_artifact(&workflow_id, artifact)?)?
            } else {
                serde_json::to_string_pretty(&store.get(&workflow_id, artifact)?)?
            };
            println!("{}", output);
        }
        ArtifactCommands::Delete {
            workflow_id,
            artifact_type,
        } => {
            let artifact: ArtifactType = artifact_type.parse()?;
            if store
                .delete(&workflow_id, artifact)
                .with_context(|| format!("Failed to delete {} from {}", artifact, workflow_id))?
            {
                println!("{} Deleted {} from {}", style("✓").green(), artifact, workflow_id);
            } else {
                println!("{} not present in {}", artifact, workflow_id);
            }
        }
        ArtifactCommands::Types => {
            for artifact in ArtifactType::ALL {
                println!("{}", artifact);
            }
        }
        ArtifactCommands::Path { workflow_id } => {
            println!("{}", store.path_for(&workflow_id)?.display());
        }
    }
    Ok(())
}
