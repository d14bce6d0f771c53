//! Pipeline transition commands.

use anyhow::{Context, Result};
use std::path::Path;

use conductor::config::PreviewSection;
use conductor::gates::{GateMode, Verdict};
use conductor::pipeline::{AdvanceOutcome, AgentId, AgentResult, NextAction, PreviewDecision};
use conductor::preview::find_available_port;

use super::open_orchestrator;

fn parse_agent(agent: &str) -> Result<AgentId> {
    Ok(agent.parse::<AgentId>()?)
}

fn print_outcome(outcome: &AdvanceOutcome, preview: &PreviewSection) {
    let action = outcome.next_action.to_string();
    let styled = match outcome.next_action {
        NextAction::Wait | NextAction::Deviation => console::style(action).yellow().bold(),
        NextAction::Complete => console::style(action).green().bold(),
        _ => console::style(action).cyan(),
    };
    println!("Next action: {styled}");
    if let Some(verdict) = outcome.verdict {
        println!("Verdict:     {verdict}");
    }
    if let Some(agent) = outcome.next_agent {
        println!("Next agent:  {agent}");
    }
    if outcome.needs_mode_switch {
        println!("Phase advanced.");
    }
    if let Some(action) = outcome.server_action {
        println!("Preview server: {action}");
    }
    if outcome.next_action == NextAction::Deviation {
        println!("Pipeline stopped for re-planning.");
        println!("Run `conductor reset <agent>` to choose where to resume.");
    }

    if outcome.next_action == NextAction::UserPreview {
        if let Some(ctx) = outcome.preview_context {
            println!("QA score:    {}", ctx.qa_score);
        }
        match find_available_port(preview.port, preview.port_attempts) {
            Ok(port) => println!("Start the preview on port {port}."),
            Err(e) => println!("{} {}", console::style("Warning:").yellow(), e),
        }
        println!("Then run `conductor preview <approve-keep|approve-kill|adjust|rethink>`.");
    }
}

pub fn cmd_start(project_dir: &Path, agent: &str) -> Result<()> {
    let agent = parse_agent(agent)?;
    let orchestrator = open_orchestrator(project_dir)?;
    orchestrator.start_agent(agent)?;
    println!("{} is in progress.", console::style(agent).cyan());
    Ok(())
}

pub fn cmd_complete(project_dir: &Path, agent: &str, score: u8, critical: bool) -> Result<()> {
    let agent = parse_agent(agent)?;
    let orchestrator = open_orchestrator(project_dir)?;
    let result = AgentResult {
        critical_blocker: critical,
        ..AgentResult::scored(score)
    };
    let outcome = orchestrator.complete_agent(agent, result)?;
    print_outcome(&outcome, &orchestrator.config().toml.preview);
    Ok(())
}

pub fn cmd_gate(project_dir: &Path, agent: &str, human: bool) -> Result<()> {
    let agent = parse_agent(agent)?;
    let orchestrator = open_orchestrator(project_dir)?;
    let gate = orchestrator.gate_for(agent)?;
    let mode = if human {
        GateMode::HumanInTheLoop
    } else {
        orchestrator.config().toml.gates.mode
    };

    let advance = orchestrator.evaluate_and_advance(agent, &gate, mode)?;
    let result = &advance.gate;

    println!();
    let verdict = result.verdict.to_string();
    let verdict = match result.verdict {
        Verdict::Approved => console::style(verdict).green().bold(),
        Verdict::NeedsRevision => console::style(verdict).yellow().bold(),
        Verdict::Blocked => console::style(verdict).red().bold(),
    };
    println!("Gate {} for {}: {}", result.gate, agent, verdict);
    println!(
        "Score: {}/{} ({} criteria)",
        result.score, result.threshold, result.criteria_count
    );
    for warning in &result.warnings {
        if warning.critical {
            println!("  {} {}", console::style("critical:").red(), warning.message);
        } else {
            println!("  {} {}", console::style("warning:").yellow(), warning.message);
        }
    }
    println!("{}", result.recommendation);
    println!();

    match &advance.outcome {
        Some(outcome) => print_outcome(outcome, &orchestrator.config().toml.preview),
        None => println!(
            "Awaiting approval. Run `conductor approve {} --score {}` to continue.",
            agent, result.score
        ),
    }
    Ok(())
}

pub fn cmd_approve(project_dir: &Path, agent: &str, score: u8) -> Result<()> {
    let agent = parse_agent(agent)?;
    let orchestrator = open_orchestrator(project_dir)?;
    let outcome = orchestrator.approve_gate(agent, score)?;
    print_outcome(&outcome, &orchestrator.config().toml.preview);
    Ok(())
}

const DECISIONS: [PreviewDecision; 4] = [
    PreviewDecision::ApproveKeep,
    PreviewDecision::ApproveKill,
    PreviewDecision::Adjust,
    PreviewDecision::Rethink,
];

fn decision_label(decision: PreviewDecision) -> &'static str {
    match decision {
        PreviewDecision::ApproveKeep => "Approve and keep the preview server running",
        PreviewDecision::ApproveKill => "Approve and stop the preview server",
        PreviewDecision::Adjust => "Adjust: send back to the implementer",
        PreviewDecision::Rethink => "Rethink: stop the pipeline for re-planning (reset to resume)",
    }
}

fn prompt_decision() -> Result<PreviewDecision> {
    use dialoguer::Select;

    let items = DECISIONS.map(decision_label);
    let selection = Select::new()
        .with_prompt("Preview decision")
        .items(&items)
        .default(0)
        .interact()
        .context("Failed to read preview decision")?;
    Ok(DECISIONS[selection])
}

pub fn cmd_preview(project_dir: &Path, decision: Option<&str>) -> Result<()> {
    let orchestrator = open_orchestrator(project_dir)?;
    let decision = match decision {
        Some(d) => d.parse::<PreviewDecision>()?,
        None => prompt_decision()?,
    };
    let outcome = orchestrator.confirm_preview(decision)?;
    print_outcome(&outcome, &orchestrator.config().toml.preview);
    Ok(())
}

pub fn cmd_reset(project_dir: &Path, agent: &str) -> Result<()> {
    let agent = parse_agent(agent)?;
    let orchestrator = open_orchestrator(project_dir)?;
    let state = orchestrator.reset_to(agent)?;
    println!(
        "Pipeline reset to {} (phase {}).",
        console::style(agent).cyan(),
        state.phase
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_labels_describe_outcomes() {
        let labels = DECISIONS.map(decision_label);
        assert!(labels[2].contains("implementer"));
        assert!(!labels[3].contains("architect"));
        assert!(labels[3].contains("re-planning"));
    }
}
