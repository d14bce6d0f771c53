//! Configuration view and validation commands.

use anyhow::Result;
use std::path::Path;

use conductor::config::{CONDUCTOR_DIR, CONFIG_FILE, ConductorToml};

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = project_dir.join(CONDUCTOR_DIR).join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Conductor Configuration");
            println!("=======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                ConductorToml::load(&config_path)?
            } else {
                println!("No conductor.toml found at {}", config_path.display());
                println!("Using default configuration.");
                ConductorToml::default()
            };
            println!();

            println!("[project]");
            if let Some(name) = &toml.project.name {
                println!("  name = \"{}\"", name);
            }
            println!("  kind = \"{}\"", toml.project.kind);
            println!();

            println!("[gates]");
            println!("  threshold = {}", toml.gates.threshold);
            println!("  mode = {:?}", toml.gates.mode);
            for (agent, criteria) in &toml.gates.criteria {
                println!("  [gates.criteria.{}]", agent);
                for artifact in &criteria.artifacts {
                    let marker = if artifact.critical { " (critical)" } else { "" };
                    println!("    {}{}", artifact.path, marker);
                }
            }
            println!();

            println!("[spawn]");
            println!("  kill_grace_ms = {}", toml.spawn.kill_grace_ms);
            println!("  skip_permissions = {}", toml.spawn.skip_permissions);
            println!();

            println!("[build]");
            println!("  max_attempts = {}", toml.build.max_attempts);
            println!("  timeout_secs = {}", toml.build.timeout_secs);
            println!();

            println!("[preview]");
            println!("  port = {}", toml.preview.port);
            println!("  port_attempts = {}", toml.preview.port_attempts);
            println!();

            println!("Effective values (with env overrides):");
            println!("  provider = \"{}\"", toml.provider());
            match toml.command() {
                Some(cmd) => println!("  command = \"{}\"", cmd),
                None => println!("  command = (provider default)"),
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No conductor.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ConductorToml::load(&config_path)?;
            let warnings = toml.validate();

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
    }

    Ok(())
}
