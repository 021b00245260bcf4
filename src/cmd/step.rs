//! Step registry commands (`rouge step`).

use anyhow::{Context, Result, bail};
use console::style;

use rouge::rouge_config::RougeConfig;
use rouge::util::make_workflow_id;
use rouge::workflow::{StepId, default_registry};

use super::super::StepCommands;
use super::{build_executor, connect_queue};

fn join<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    let joined: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined.join(", ")
    }
}

pub async fn cmd_step(config: &RougeConfig, command: StepCommands) -> Result<()> {
    match command {
        StepCommands::List => {
            let registry = default_registry(&config.toml)?;
            println!();
            println!(
                "{:<16} {:<28} {:<22} {:<8} {:<8} Notes",
                "Step", "Requires", "Produces", "Retries", "Timeout"
            );
            println!(
                "{:<16} {:<28} {:<22} {:<8} {:<8} -----",
                "----------------", "----------------------------", "----------------------", "-------", "-------"
            );
            for step in registry.steps() {
                println!(
                    "{:<16} {:<28} {:<22} {:<8} {:<8} {}",
                    step.id.as_str(),
                    join(&step.requires),
                    join(&step.produces),
                    step.retry.max_retries(),
                    format!("{}s", step.timeout.as_secs()),
                    if step.critical { "" } else { "best-effort" }
                );
            }
            println!();
        }
        StepCommands::Run {
            name,
            issue_id,
            workflow_id,
        } => {
            let step_id: StepId = name.parse()?;
            let executor = build_executor(config, connect_queue(config).await?)?;
            let step = executor.registry().step(step_id)?;

            let workflow_id = match workflow_id {
                Some(id) => id,
                None if step.requires.is_empty() => make_workflow_id(),
                None => bail!(
                    "Step '{}' requires {}; pass --workflow-id of a workflow that has them",
                    step_id,
                    join(&step.requires)
                ),
            };

            println!("Running step {} for workflow {}", style(step_id).cyan(), style(&workflow_id).bold());
            let stored = executor
                .run_step(&workflow_id, issue_id, step_id)
                .await
                .with_context(|| format!("Step '{}' failed", step_id))?;
            println!("{} stored {}", style("✓").green(), join(&stored));
        }
        StepCommands::Deps { name } => {
            let step_id: StepId = name.parse()?;
            let registry = default_registry(&config.toml)?;
            let deps = registry.dependencies_of(step_id)?;
            if deps.is_empty() {
                println!("{} has no dependencies", step_id);
            } else {
                println!("{} depends on (execution order):", step_id);
                for dep in deps {
                    println!("  {}", dep);
                }
            }
        }
        StepCommands::Validate => {
            let registry = default_registry(&config.toml)?;
            println!("{} {} steps registered, graph is valid", style("✓").green(), registry.len());
            for (label, targets) in [("main", config.main_targets()?), ("patch", config.patch_targets()?)] {
                let order = registry.resolve_order(&targets)?;
                println!("  {:<6} {}", label, join(order));
            }
        }
    }
    Ok(())
}
