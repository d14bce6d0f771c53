//! Session record for one project's pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::roster::{AgentId, Phase, ProjectKind, roster_for};
use crate::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
    NeedsRevalidation,
}

impl AgentStatus {
    /// Completed or skipped agents no longer need to run.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Pending => "pending",
            AgentStatus::InProgress => "in_progress",
            AgentStatus::Completed => "completed",
            AgentStatus::Skipped => "skipped",
            AgentStatus::NeedsRevalidation => "needs_revalidation",
        };
        f.write_str(s)
    }
}

/// Per-agent progress. `score` is only present while `status` is `Completed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    pub(crate) fn clear(&mut self, status: AgentStatus) {
        *self = AgentRecord {
            status,
            ..Default::default()
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Started,
    Completed,
    GateWaiting,
    PreviewDecision,
    ResetTo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub agent: AgentId,
    pub action: HistoryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(agent: AgentId, action: HistoryAction) -> Self {
        Self {
            agent,
            action,
            score: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_score(mut self, score: u8) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// What caused the pipeline to change phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    /// A gate passed and the pipeline advanced by itself.
    Autonomous,
    /// A human preview decision moved the pipeline.
    User,
    /// An explicit reset rewound the pipeline.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeTransition {
    pub from: Phase,
    pub to: Phase,
    pub trigger: TransitionTrigger,
    pub timestamp: DateTime<Utc>,
}

/// The authoritative session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub phase: Phase,
    #[serde(default)]
    pub project_kind: ProjectKind,
    pub agents: BTreeMap<AgentId, AgentRecord>,
    #[serde(default)]
    pub completed_agents: Vec<AgentId>,
    #[serde(default)]
    pub current_agent: Option<AgentId>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub mode_transitions: Vec<ModeTransition>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    /// Fresh state with every roster agent pending.
    pub fn new(kind: ProjectKind) -> Self {
        Self {
            phase: Phase::Discover,
            project_kind: kind,
            agents: roster_for(kind)
                .into_iter()
                .map(|a| (a, AgentRecord::default()))
                .collect(),
            completed_agents: Vec::new(),
            current_agent: None,
            history: Vec::new(),
            mode_transitions: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Roster agents in run order.
    pub fn roster(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    pub fn agent(&self, agent: AgentId) -> Option<&AgentRecord> {
        self.agents.get(&agent)
    }

    pub fn status_of(&self, agent: AgentId) -> Option<AgentStatus> {
        self.agents.get(&agent).map(|r| r.status)
    }

    pub fn ensure_in_roster(&self, agent: AgentId) -> Result<(), PipelineError> {
        if self.agents.contains_key(&agent) {
            Ok(())
        } else {
            Err(PipelineError::AgentNotInRoster { agent })
        }
    }

    /// Agents of `phase` present in this roster, in run order.
    pub fn phase_agents(&self, phase: Phase) -> Vec<AgentId> {
        self.agents
            .keys()
            .copied()
            .filter(|a| a.phase() == phase)
            .collect()
    }

    /// The agent following `agent` within its own phase.
    pub fn next_in_phase(&self, agent: AgentId) -> Option<AgentId> {
        let agents = self.phase_agents(agent.phase());
        let idx = agents.iter().position(|a| *a == agent)?;
        agents.get(idx + 1).copied()
    }

    /// First agent of `phase` that is not completed or skipped.
    pub fn next_unfinished_in_phase(&self, phase: Phase) -> Option<AgentId> {
        self.phase_agents(phase)
            .into_iter()
            .find(|a| self.status_of(*a).is_some_and(|s| !s.is_done()))
    }

    /// First roster agent that still has work to do.
    pub fn next_pending_agent(&self) -> Option<AgentId> {
        self.agents
            .iter()
            .find(|(_, r)| !r.status.is_done())
            .map(|(a, _)| *a)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}
