//! Project initialization and status commands.

use anyhow::Result;
use std::path::Path;

use conductor::pipeline::{AgentStatus, Phase, ProjectKind};

use super::open_orchestrator;

pub fn cmd_init(project_dir: &Path, existing: bool) -> Result<()> {
    use conductor::init::init_project;

    let kind = if existing {
        ProjectKind::Existing
    } else {
        ProjectKind::Greenfield
    };
    let result = init_project(project_dir, kind)?;

    if result.created {
        println!(
            "Initialized conductor project at {}",
            result.conductor_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .conductor/");
        println!("  ├── conductor.toml   # Gates, spawn and build settings");
        println!("  ├── pipeline.json    # Pipeline state ({kind})");
        println!("  └── logs/            # conductor.log and executor logs");
        println!();
        println!("Next steps:");
        println!("  1. Add gate criteria under [gates.criteria.<agent>] in conductor.toml");
        println!("  2. Run `conductor status` to see the first agent");
    } else if result.pipeline_created {
        println!(
            "Completed conductor initialization at {}",
            result.conductor_dir.display()
        );
    } else {
        println!(
            "Conductor project already initialized at {}",
            result.conductor_dir.display()
        );
        println!("Directory structure verified.");
    }

    Ok(())
}

fn styled_status(status: AgentStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        AgentStatus::Completed => console::style(text).green(),
        AgentStatus::InProgress => console::style(text).cyan(),
        AgentStatus::Skipped => console::style(text).dim(),
        AgentStatus::NeedsRevalidation => console::style(text).yellow(),
        AgentStatus::Pending => console::style(text),
    }
}

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    let orchestrator = open_orchestrator(project_dir)?;
    let state = orchestrator.state()?;
    let progress = orchestrator.progress()?;
    let check = orchestrator.check_transition()?;

    println!();
    println!("{}", console::style("Pipeline Status").bold().cyan());
    println!();
    println!("Project kind: {}", state.project_kind);
    println!("Phase:        {}", state.phase);
    println!("Progress:     {}%", progress.progress);
    if let Some(agent) = state.current_agent {
        println!("Current:      {agent}");
    }
    if let Some(next) = progress.next_agent {
        println!("Next:         {next}");
    }
    println!();

    for phase in [Phase::Discover, Phase::Plan, Phase::Build, Phase::Deploy] {
        println!("{}", console::style(phase.as_str()).bold());
        for agent in state.phase_agents(phase) {
            let Some(record) = state.agent(agent) else {
                continue;
            };
            let score = record
                .score
                .map(|s| format!(" ({s})"))
                .unwrap_or_default();
            println!(
                "  {:<18} {}{}",
                agent.as_str(),
                styled_status(record.status),
                score
            );
        }
    }
    println!();

    if state.is_complete() {
        println!("{}", console::style("Pipeline complete.").green().bold());
    } else if check.can_advance {
        println!("{}", console::style(&check.reason).green());
    } else {
        println!("{}", console::style(&check.reason).dim());
    }
    println!();
    Ok(())
}
