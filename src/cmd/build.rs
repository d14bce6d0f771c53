//! Autonomous build loop commands.

use anyhow::Result;
use std::path::Path;

use conductor::build::{BuildEvent, BuildRequest, BuildStatus, CheckpointStatus, get_build_status};

use super::open_orchestrator;

fn print_event(event: &BuildEvent) {
    match event {
        BuildEvent::TaskStarted { task_id, attempt } => {
            println!("{} {} (attempt {})", console::style("▶").cyan(), task_id, attempt);
        }
        BuildEvent::TaskCompleted { task_id, attempt } => {
            println!("{} {} (attempt {})", console::style("✓").green(), task_id, attempt);
        }
        BuildEvent::TaskFailed {
            task_id,
            attempt,
            error,
        } => {
            println!(
                "{} {} (attempt {}): {}",
                console::style("✗").red(),
                task_id,
                attempt,
                console::style(error).dim()
            );
        }
        BuildEvent::TaskExhausted { task_id, attempts } => {
            println!(
                "{} {} gave up after {} attempts",
                console::style("!").red().bold(),
                task_id,
                attempts
            );
        }
    }
}

fn styled_build_status(status: BuildStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        BuildStatus::Completed => console::style(text).green().bold(),
        BuildStatus::Failed | BuildStatus::Abandoned => console::style(text).red().bold(),
        BuildStatus::Running => console::style(text).cyan(),
        BuildStatus::Pending => console::style(text),
    }
}

pub async fn cmd_build(project_dir: &Path, tasks: &[String], resume: bool) -> Result<()> {
    let orchestrator = open_orchestrator(project_dir)?;
    let request = BuildRequest::new(tasks).resume(resume);

    println!();
    println!("{}", console::style("Build").bold().cyan());
    println!();

    let summary = orchestrator.run_build(&request, print_event).await?;

    println!();
    println!(
        "Build {}: {} completed, {} failed, {} attempts in {}s",
        styled_build_status(summary.status),
        summary.completed,
        summary.failed,
        summary.total_attempts,
        summary.duration.as_secs()
    );
    println!();
    Ok(())
}

pub fn cmd_build_status(project_dir: &Path) -> Result<()> {
    let Some(snapshot) = get_build_status(project_dir)? else {
        println!("No build session found.");
        return Ok(());
    };

    println!();
    println!("{}", console::style("Build Status").bold().cyan());
    println!();
    println!("Session:  {}", snapshot.session_id);
    println!("Status:   {}", styled_build_status(snapshot.status));
    println!(
        "Tasks:    {} total, {} completed, {} failed, {} in progress, {} pending",
        snapshot.total,
        snapshot.completed,
        snapshot.failed,
        snapshot.in_progress,
        snapshot.pending
    );
    println!("Attempts: {}", snapshot.total_attempts);
    println!("Started:  {}", snapshot.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(last) = snapshot.last_checkpoint {
        println!("Last checkpoint: {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();

    for checkpoint in &snapshot.checkpoints {
        let status = checkpoint.status.to_string();
        let status = match checkpoint.status {
            CheckpointStatus::Completed => console::style(status).green(),
            CheckpointStatus::Failed => console::style(status).red(),
            CheckpointStatus::InProgress => console::style(status).cyan(),
            CheckpointStatus::Pending => console::style(status).dim(),
        };
        println!(
            "  {:<24} {} ({} attempts)",
            checkpoint.task_id, status, checkpoint.attempts
        );
        if let Some(error) = &checkpoint.error {
            println!("    {}", console::style(error).dim());
        }
    }
    println!();
    Ok(())
}
