//! Transition functions over [`PipelineState`].
//!
//! Each function validates its arguments before touching the state, so a
//! rejected call leaves the state exactly as it was.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::roster::{AgentId, PHASE_THRESHOLD, Phase, ProjectKind};
use super::state::{
    AgentStatus, HistoryAction, HistoryEntry, ModeTransition, PipelineState, TransitionTrigger,
};
use crate::errors::PipelineError;
use crate::gates::{Verdict, determine_verdict};
use crate::preview::ServerAction;

/// What the finished agent reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentResult {
    pub score: u8,
    #[serde(default)]
    pub criteria_count: Option<u32>,
    #[serde(default)]
    pub critical_blocker: bool,
}

impl AgentResult {
    pub fn scored(score: u8) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Continue,
    AdvancePhase,
    Wait,
    UserPreview,
    Deviation,
    Complete,
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NextAction::Continue => "continue",
            NextAction::AdvancePhase => "advance_phase",
            NextAction::Wait => "wait",
            NextAction::UserPreview => "user_preview",
            NextAction::Deviation => "deviation",
            NextAction::Complete => "complete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewContext {
    pub qa_score: u8,
}

/// Decision the state machine hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    pub next_action: NextAction,
    pub next_agent: Option<AgentId>,
    #[serde(default)]
    pub needs_mode_switch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_context: Option<PreviewContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_action: Option<ServerAction>,
}

impl AdvanceOutcome {
    fn new(next_action: NextAction, next_agent: Option<AgentId>) -> Self {
        Self {
            next_action,
            next_agent,
            needs_mode_switch: false,
            verdict: None,
            preview_context: None,
            server_action: None,
        }
    }
}

/// Human decision that resolves a `user_preview` pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewDecision {
    ApproveKeep,
    ApproveKill,
    Adjust,
    Rethink,
}

impl std::fmt::Display for PreviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PreviewDecision::ApproveKeep => "approve_keep",
            PreviewDecision::ApproveKill => "approve_kill",
            PreviewDecision::Adjust => "adjust",
            PreviewDecision::Rethink => "rethink",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for PreviewDecision {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "approve_keep" => Ok(PreviewDecision::ApproveKeep),
            "approve_kill" => Ok(PreviewDecision::ApproveKill),
            "adjust" => Ok(PreviewDecision::Adjust),
            "rethink" => Ok(PreviewDecision::Rethink),
            _ => Err(PipelineError::InvalidPreviewDecision(s.to_string())),
        }
    }
}

/// Read-only answer to "could the current phase advance right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransitionCheck {
    pub phase: Phase,
    pub can_advance: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_score: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineProgress {
    /// Percent of the roster that is completed or skipped.
    pub progress: u8,
    pub completed_agents: Vec<AgentId>,
    pub next_agent: Option<AgentId>,
}

pub fn init_pipeline(kind: ProjectKind) -> PipelineState {
    let state = PipelineState::new(kind);
    tracing::info!(project_kind = %kind, agents = state.agents.len(), "pipeline initialized");
    state
}

pub fn mark_agent_in_progress(state: &mut PipelineState, agent: AgentId) -> Result<(), PipelineError> {
    state.ensure_in_roster(agent)?;
    if let Some(record) = state.agents.get_mut(&agent) {
        record.clear(AgentStatus::InProgress);
        record.started_at = Some(Utc::now());
    }
    state.current_agent = Some(agent);
    state
        .history
        .push(HistoryEntry::new(agent, HistoryAction::Started));
    tracing::debug!(%agent, "agent in progress");
    Ok(())
}

/// Record `agent` as finished and decide what happens next.
///
/// Gates are judged against [`PHASE_THRESHOLD`].
pub fn advance_pipeline(
    state: &mut PipelineState,
    agent: AgentId,
    result: &AgentResult,
) -> Result<AdvanceOutcome, PipelineError> {
    advance_pipeline_with_threshold(state, agent, result, PHASE_THRESHOLD)
}

/// [`advance_pipeline`] with an explicit gate threshold.
///
/// An agent of a phase the pipeline has not reached yet is rejected. The
/// phase gate is only judged once every other agent of the phase is done.
pub fn advance_pipeline_with_threshold(
    state: &mut PipelineState,
    agent: AgentId,
    result: &AgentResult,
    threshold: u8,
) -> Result<AdvanceOutcome, PipelineError> {
    state.ensure_in_roster(agent)?;
    let phase = agent.phase();
    if phase > state.phase {
        return Err(PipelineError::PhaseNotReached {
            agent,
            phase: state.phase,
        });
    }

    let now = Utc::now();
    if let Some(record) = state.agents.get_mut(&agent) {
        record.status = AgentStatus::Completed;
        record.score = Some(result.score);
        record.criteria_count = result.criteria_count;
        record.completed_at = Some(now);
    }
    if !state.completed_agents.contains(&agent) {
        state.completed_agents.push(agent);
    }
    state
        .history
        .push(HistoryEntry::new(agent, HistoryAction::Completed).with_score(result.score));

    if phase < state.phase {
        // A re-run of an agent from a phase the pipeline already left.
        let next = state.next_pending_agent();
        state.current_agent = next;
        return Ok(AdvanceOutcome::new(NextAction::Continue, next));
    }

    if let Some(next) = state.next_unfinished_in_phase(phase) {
        state.current_agent = Some(next);
        return Ok(AdvanceOutcome::new(NextAction::Continue, Some(next)));
    }

    if !agent.is_gating() {
        // The gate finished before its siblings; it has to run again.
        let gate = phase.gating_agent();
        state.current_agent = Some(gate);
        return Ok(AdvanceOutcome::new(NextAction::Continue, Some(gate)));
    }

    if phase == Phase::Deploy {
        state.completed_at = Some(now);
        state.current_agent = None;
        tracing::info!(%agent, "pipeline complete");
        return Ok(AdvanceOutcome::new(NextAction::Complete, None));
    }

    let verdict = determine_verdict(result.score, threshold, result.critical_blocker);
    if verdict != Verdict::Approved {
        state.current_agent = Some(agent);
        state.history.push(
            HistoryEntry::new(agent, HistoryAction::GateWaiting)
                .with_score(result.score)
                .with_detail(verdict.to_string()),
        );
        tracing::info!(%agent, score = result.score, %verdict, "gate not passed; waiting");
        let mut outcome = AdvanceOutcome::new(NextAction::Wait, None);
        outcome.verdict = Some(verdict);
        return Ok(outcome);
    }

    if phase == Phase::Build {
        // Deployment always needs a human decision first.
        state.current_agent = None;
        tracing::info!(%agent, score = result.score, "build gate passed; awaiting preview decision");
        let mut outcome = AdvanceOutcome::new(NextAction::UserPreview, None);
        outcome.verdict = Some(verdict);
        outcome.preview_context = Some(PreviewContext {
            qa_score: result.score,
        });
        return Ok(outcome);
    }

    let mut outcome = AdvanceOutcome::new(NextAction::AdvancePhase, None);
    if let Some(target) = phase.next() {
        outcome.next_agent = enter_phase(state, target, TransitionTrigger::Autonomous);
        outcome.needs_mode_switch = true;
    }
    outcome.verdict = Some(verdict);
    Ok(outcome)
}

/// Resolve the pause left by a passing build gate.
pub fn confirm_preview(
    state: &mut PipelineState,
    decision: PreviewDecision,
) -> Result<AdvanceOutcome, PipelineError> {
    let qa = Phase::Build.gating_agent();
    if state.phase != Phase::Build || state.status_of(qa) != Some(AgentStatus::Completed) {
        return Err(PipelineError::NotAwaitingPreview { phase: state.phase });
    }

    state.history.push(
        HistoryEntry::new(qa, HistoryAction::PreviewDecision).with_detail(decision.to_string()),
    );
    tracing::info!(%decision, "preview decision");

    match decision {
        PreviewDecision::ApproveKeep | PreviewDecision::ApproveKill => {
            let first = enter_phase(state, Phase::Deploy, TransitionTrigger::User);
            let mut outcome = AdvanceOutcome::new(NextAction::AdvancePhase, first);
            outcome.needs_mode_switch = true;
            outcome.server_action = Some(if decision == PreviewDecision::ApproveKeep {
                ServerAction::Keep
            } else {
                ServerAction::Kill
            });
            Ok(outcome)
        }
        PreviewDecision::Adjust => {
            let implementer = AgentId::Implementer;
            for agent in [implementer, qa] {
                if let Some(record) = state.agents.get_mut(&agent) {
                    record.clear(AgentStatus::NeedsRevalidation);
                }
            }
            state
                .completed_agents
                .retain(|a| *a != implementer && *a != qa);
            state.current_agent = Some(implementer);
            Ok(AdvanceOutcome::new(NextAction::Continue, Some(implementer)))
        }
        PreviewDecision::Rethink => {
            state.current_agent = None;
            Ok(AdvanceOutcome::new(NextAction::Deviation, None))
        }
    }
}

pub fn check_phase_transition(state: &PipelineState) -> PhaseTransitionCheck {
    check_phase_transition_with_threshold(state, PHASE_THRESHOLD)
}

/// [`check_phase_transition`] with an explicit gate threshold.
pub fn check_phase_transition_with_threshold(
    state: &PipelineState,
    threshold: u8,
) -> PhaseTransitionCheck {
    let phase = state.phase;
    let gate = phase.gating_agent();
    let blocked = |reason: String, required_score: Option<u8>| PhaseTransitionCheck {
        phase,
        can_advance: false,
        reason,
        required_score,
    };

    if state.is_complete() {
        return blocked("Pipeline is complete".to_string(), None);
    }

    let unfinished: Vec<String> = state
        .phase_agents(phase)
        .into_iter()
        .filter(|a| *a != gate && state.status_of(*a).is_some_and(|s| !s.is_done()))
        .map(|a| a.to_string())
        .collect();
    if !unfinished.is_empty() {
        return blocked(
            format!("Agents still pending in {}: {}", phase, unfinished.join(", ")),
            None,
        );
    }

    let record = state.agent(gate);
    let score = match record {
        Some(r) if r.status == AgentStatus::Completed => r.score.unwrap_or(0),
        _ => {
            return blocked(format!("Gating agent {} has not completed", gate), None);
        }
    };

    if phase == Phase::Deploy {
        return blocked("Deploy is the final phase".to_string(), None);
    }

    if determine_verdict(score, threshold, false) != Verdict::Approved {
        return blocked(
            format!("{} scored {}, below the required {}", gate, score, threshold),
            Some(threshold),
        );
    }

    if phase == Phase::Build {
        return blocked(
            format!("{} passed with {}; awaiting preview decision", gate, score),
            None,
        );
    }

    PhaseTransitionCheck {
        phase,
        can_advance: true,
        reason: format!("{} passed with {}", gate, score),
        required_score: None,
    }
}

/// Rewind the pipeline so `agent` runs again.
pub fn reset_pipeline_to(state: &mut PipelineState, agent: AgentId) -> Result<(), PipelineError> {
    state.ensure_in_roster(agent)?;

    let roster = state.roster();
    let idx = roster.iter().position(|a| *a == agent).unwrap_or(0);

    for later in &roster[idx + 1..] {
        if let Some(record) = state.agents.get_mut(later) {
            record.clear(AgentStatus::Pending);
        }
    }
    if let Some(record) = state.agents.get_mut(&agent) {
        record.clear(AgentStatus::InProgress);
        record.started_at = Some(Utc::now());
    }

    let earlier = &roster[..idx];
    state.completed_agents.retain(|a| earlier.contains(a));

    let target = agent.phase();
    if target != state.phase {
        state.mode_transitions.push(ModeTransition {
            from: state.phase,
            to: target,
            trigger: TransitionTrigger::Reset,
            timestamp: Utc::now(),
        });
        state.phase = target;
    }
    state.current_agent = Some(agent);
    state.completed_at = None;
    state
        .history
        .push(HistoryEntry::new(agent, HistoryAction::ResetTo));
    tracing::info!(%agent, phase = %target, "pipeline reset");
    Ok(())
}

pub fn get_pipeline_progress(state: &PipelineState) -> PipelineProgress {
    let total = state.agents.len();
    let done = state.agents.values().filter(|r| r.status.is_done()).count();
    let progress = if total == 0 {
        0
    } else {
        ((done as f64 / total as f64) * 100.0).round() as u8
    };
    PipelineProgress {
        progress,
        completed_agents: state.completed_agents.clone(),
        next_agent: state.next_pending_agent(),
    }
}

fn enter_phase(state: &mut PipelineState, target: Phase, trigger: TransitionTrigger) -> Option<AgentId> {
    state.mode_transitions.push(ModeTransition {
        from: state.phase,
        to: target,
        trigger,
        timestamp: Utc::now(),
    });
    tracing::info!(from = %state.phase, to = %target, ?trigger, "phase advanced");
    state.phase = target;
    let first = state.phase_agents(target).first().copied();
    state.current_agent = first;
    first
}
