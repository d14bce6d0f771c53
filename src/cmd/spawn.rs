//! `conductor spawn`: run one executor in the foreground.

use anyhow::{Context, Result};
use std::path::Path;

use conductor::spawn::{SpawnCommand, SpawnConfig, get_terminal_status, kill_terminal};

use super::open_orchestrator;

fn print_dry_run(command: &SpawnCommand) {
    println!("{}", console::style("Dry run").bold().cyan());
    println!("Terminal: {}", command.terminal_id);
    println!("Command:  {} {}", command.command, command.args.join(" "));
    println!("Environment:");
    // Inherited variables can carry credentials; only show ours.
    for (key, value) in command.env.iter().filter(|(k, _)| k.starts_with("CONDUCTOR_")) {
        println!("  {key}={value}");
    }
    if let Some(prompt) = &command.prompt {
        println!("Prompt on stdin ({} chars)", prompt.chars().count());
    }
}

pub async fn cmd_spawn(
    project_dir: &Path,
    agent: &str,
    task: &str,
    model: Option<&str>,
    prompt: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let orchestrator = open_orchestrator(project_dir)?;

    let mut config = SpawnConfig {
        agent: Some(agent.to_string()),
        task_id: Some(task.to_string()),
        ..SpawnConfig::default()
    };
    if let Some(model) = model {
        config = config.with_model(model);
    }
    if let Some(prompt) = prompt {
        config = config.with_prompt(prompt);
    }

    if dry_run {
        let command = orchestrator.spawner().build_spawn_command(Some(&config))?;
        print_dry_run(&command);
        return Ok(());
    }

    let mut handles = orchestrator.spawn_batch(std::slice::from_ref(&config)).await?;
    let Some(mut handle) = handles.pop() else {
        return Ok(());
    };

    println!(
        "Spawned {} (pid {})",
        console::style(&handle.id).cyan(),
        handle
            .pid()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string())
    );
    if let Some(dir) = orchestrator.spawner().log_dir() {
        println!("Log: {}", dir.join(format!("{}.log", handle.id)).display());
    }

    let grace = orchestrator.spawner().kill_grace();
    tokio::select! {
        exit = handle.wait() => {
            exit.with_context(|| format!("Failed waiting on terminal {}", handle.id))?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("{}", console::style("Interrupted, stopping executor...").yellow());
            kill_terminal(Some(&mut handle), grace).await;
        }
    }

    let status = get_terminal_status(Some(&handle));
    let code = status
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    println!(
        "Terminal {} {} (exit {}) after {}s",
        status.id,
        status.status,
        code,
        status.elapsed.as_secs()
    );
    Ok(())
}
