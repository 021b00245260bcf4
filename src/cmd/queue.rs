//! Work queue administration (`rouge queue`).

use anyhow::{Context, Result, anyhow};
use console::style;

use rouge::queue::{ItemStatus, WorkerId};
use rouge::rouge_config::RougeConfig;
use rouge::util::truncate;

use super::super::QueueCommands;

pub async fn cmd_queue(config: &RougeConfig, command: QueueCommands) -> Result<()> {
    let queue = super::connect_queue(config).await?;

    match command {
        QueueCommands::Add {
            description,
            assign_to,
            patch_of,
        } => {
            if description.trim().is_empty() {
                anyhow::bail!("Issue description cannot be empty");
            }
            let worker = assign_to
                .map(|w| w.parse::<WorkerId>().map_err(|e| anyhow!(e)))
                .transpose()?;
            let item = match patch_of {
                Some(parent) => queue
                    .enqueue_patch(parent, &description, worker.as_ref())
                    .await
                    .with_context(|| format!("Failed to add patch request for issue #{}", parent))?,
                None => queue.enqueue(&description, worker.as_ref(), ItemStatus::Pending).await?,
            };
            println!(
                "{} Added issue #{} ({}{}{})",
                style("✓").green(),
                item.item_id,
                item.status,
                item.parent_id
                    .map(|p| format!(", patches #{}", p))
                    .unwrap_or_default(),
                item.assigned_to
                    .as_ref()
                    .map(|w| format!(", assigned to {}", w))
                    .unwrap_or_default()
            );
        }
        QueueCommands::List { limit } => {
            let items = queue.list_items(limit).await?;
            if items.is_empty() {
                println!("Queue is empty ({})", queue.backend());
                return Ok(());
            }
            println!("{:<6} {:<14} {:<12} {:<20} Description", "ID", "Status", "Worker", "Updated");
            println!("{:<6} {:<14} {:<12} {:<20} -----------", "------", "--------------", "------------", "--------------------");
            for item in items {
                println!(
                    "{:<6} {:<14} {:<12} {:<20} {}",
                    item.item_id,
                    item.status.as_str(),
                    item.assigned_to.as_ref().map(WorkerId::as_str).unwrap_or("-"),
                    item.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    truncate(&item.description, 60)
                );
            }
        }
        QueueCommands::Reset { issue_id } => {
            queue.update_status(issue_id, ItemStatus::Pending).await?;
            println!("{} Issue #{} reset to pending", style("✓").green(), issue_id);
        }
    }
    Ok(())
}
