//! Full pipeline run (`rouge run`).

use anyhow::{Context, Result};
use console::style;

use rouge::rouge_config::RougeConfig;
use rouge::util::{make_workflow_id, patch_workflow_id};
use rouge::workflow::{WorkflowInstance, validate_workflow_id};

use super::{build_executor, connect_queue};

pub async fn cmd_run(
    config: &RougeConfig,
    issue_id: i64,
    workflow_id: Option<String>,
    patch: bool,
    resume_from: Option<String>,
) -> Result<()> {
    let base_id = workflow_id.unwrap_or_else(make_workflow_id);
    let (workflow_id, targets) = if patch {
        (patch_workflow_id(&base_id), config.patch_targets()?)
    } else {
        (base_id, config.main_targets()?)
    };
    validate_workflow_id(&workflow_id)?;

    let queue = connect_queue(config).await?;
    let executor = build_executor(config, queue.clone())?;

    let seed_from = match resume_from {
        Some(previous) => Some(previous),
        None if patch && WorkflowInstance::load(executor.store(), &workflow_id)?.is_none() => {
            // A patch starts from the plan and implementation of the issue it patches.
            let item = queue
                .get_item(issue_id)
                .await?
                .with_context(|| format!("Issue #{} not found in the work queue", issue_id))?;
            let parent = item.parent_id.unwrap_or(issue_id);
            match WorkflowInstance::latest_completed(executor.store(), parent)? {
                Some(base) => Some(base.workflow_id),
                None => {
                    tracing::info!(issue_id = parent, "No completed workflow to patch, planning from scratch");
                    None
                }
            }
        }
        None => None,
    };

    if let Some(previous) = seed_from.filter(|p| *p != workflow_id) {
        let copied = executor
            .store()
            .copy_workflow(&previous, &workflow_id)
            .with_context(|| format!("Failed to copy artifacts from workflow {}", previous))?;
        tracing::info!(from = %previous, to = %workflow_id, copied = copied.len(), "Resuming from earlier workflow");
        println!("Copied {} artifact(s) from {}", copied.len(), previous);
    }

    println!(
        "Running {} pipeline for issue #{} (workflow {})",
        if patch { "patch" } else { "main" },
        issue_id,
        style(&workflow_id).bold()
    );

    let report = executor
        .run(&workflow_id, issue_id, &targets)
        .await
        .with_context(|| format!("Workflow {} failed", workflow_id))?;

    for step in &report.executed {
        println!("  {} {}", style("✓").green(), step);
    }
    for step in &report.skipped {
        println!("  {} {} {}", style("-").dim(), step, style("(skipped)").dim());
    }
    for failure in &report.failures {
        println!("  {} {}", style("!").yellow(), failure);
    }
    println!(
        "Workflow {} {}",
        workflow_id,
        style(report.instance.status).green().bold()
    );
    Ok(())
}
