//! Configuration view and validation commands (`rouge config`).

use anyhow::{Context, Result};

use rouge::rouge_config::{DatabaseBackend, RougeConfig, RougeToml};

use super::super::ConfigCommands;

pub fn cmd_config(config: &RougeConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.paths.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Rouge Configuration");
            println!("===================");
            println!();
            println!("Data directory: {}", config.data_dir().display());
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No rouge.toml at {} (using defaults)", config_path.display());
            }
            println!();

            let rendered = toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {}", line);
            }
            println!();

            println!("Effective values (with env overrides):");
            let backend = match config.database_backend() {
                DatabaseBackend::Sqlite(path) => format!("sqlite ({})", path.display()),
                // Credentials stay out of the terminal.
                DatabaseBackend::Postgres(_) => "postgres".to_string(),
            };
            println!("  database = {}", backend);
            println!("  default_provider = \"{}\"", config.default_provider());
            println!("  implement_provider = \"{}\"", config.implement_provider());
            println!("  claude_cmd = \"{}\"", config.claude_cmd());
            println!("  opencode_cmd = \"{}\"", config.opencode_cmd());
            println!("  log_level = \"{}\"", config.log_level());
            println!("  poll_interval = {}s", config.poll_interval().as_secs());
            println!("  workflow_timeout = {}s", config.workflow_timeout().as_secs());
            if let Some(cmd) = config.pipeline_command() {
                println!("  pipeline_command = \"{}\"", cmd);
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("rouge.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            RougeToml::default().save(&config_path)?;
            config.paths.ensure_directories()?;

            println!("Created rouge.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [worker] poll_interval_secs, workflow_timeout_secs");
            println!("  - [database] url");
            println!("  - [providers] default, implement, model");
            println!("  - [steps.overrides.\"pattern-*\"] for step-specific settings");
            println!();
        }
    }

    Ok(())
}
