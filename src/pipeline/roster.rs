//! Closed roster of phases and agents.
//!
//! Declaration order is roster order: `Ord` on [`AgentId`] sorts agents the
//! way the pipeline runs them, and `Ord` on [`Phase`] is phase progression.

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

/// Score a phase's gating agent must reach for the phase to advance.
pub const PHASE_THRESHOLD: u8 = 95;

/// Ordered macro-stages of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Discover,
    Plan,
    Build,
    Deploy,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Discover, Phase::Plan, Phase::Build, Phase::Deploy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Discover => "discover",
            Phase::Plan => "plan",
            Phase::Build => "build",
            Phase::Deploy => "deploy",
        }
    }

    /// The phase that follows this one, or `None` for the final phase.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Discover => Some(Phase::Plan),
            Phase::Plan => Some(Phase::Build),
            Phase::Build => Some(Phase::Deploy),
            Phase::Deploy => None,
        }
    }

    /// The agent whose completion decides whether this phase may end.
    ///
    /// For `Deploy` this is the terminal agent of the whole pipeline.
    pub fn gating_agent(&self) -> AgentId {
        match self {
            Phase::Discover => AgentId::Requirements,
            Phase::Plan => AgentId::PlanReviewer,
            Phase::Build => AgentId::Qa,
            Phase::Deploy => AgentId::Monitor,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s.to_lowercase())
            .ok_or_else(|| PipelineError::UnknownPhase(s.to_string()))
    }
}

/// Which discovery agent opens the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    /// New project: opens with `discovery`.
    #[default]
    Greenfield,
    /// Existing codebase: opens with `codebase-analyst`.
    Existing,
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectKind::Greenfield => write!(f, "greenfield"),
            ProjectKind::Existing => write!(f, "existing"),
        }
    }
}

impl std::str::FromStr for ProjectKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "greenfield" | "new" => Ok(ProjectKind::Greenfield),
            "existing" | "brownfield" => Ok(ProjectKind::Existing),
            _ => Err(PipelineError::UnknownProjectKind(s.to_string())),
        }
    }
}

/// Every agent the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentId {
    Discovery,
    CodebaseAnalyst,
    Researcher,
    Requirements,
    Architect,
    UxDesigner,
    ApiDesigner,
    PlanReviewer,
    Scaffolder,
    Implementer,
    Qa,
    Deployer,
    Monitor,
}

impl AgentId {
    pub const ALL: [AgentId; 13] = [
        AgentId::Discovery,
        AgentId::CodebaseAnalyst,
        AgentId::Researcher,
        AgentId::Requirements,
        AgentId::Architect,
        AgentId::UxDesigner,
        AgentId::ApiDesigner,
        AgentId::PlanReviewer,
        AgentId::Scaffolder,
        AgentId::Implementer,
        AgentId::Qa,
        AgentId::Deployer,
        AgentId::Monitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Discovery => "discovery",
            AgentId::CodebaseAnalyst => "codebase-analyst",
            AgentId::Researcher => "researcher",
            AgentId::Requirements => "requirements",
            AgentId::Architect => "architect",
            AgentId::UxDesigner => "ux-designer",
            AgentId::ApiDesigner => "api-designer",
            AgentId::PlanReviewer => "plan-reviewer",
            AgentId::Scaffolder => "scaffolder",
            AgentId::Implementer => "implementer",
            AgentId::Qa => "qa",
            AgentId::Deployer => "deployer",
            AgentId::Monitor => "monitor",
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            AgentId::Discovery
            | AgentId::CodebaseAnalyst
            | AgentId::Researcher
            | AgentId::Requirements => Phase::Discover,
            AgentId::Architect
            | AgentId::UxDesigner
            | AgentId::ApiDesigner
            | AgentId::PlanReviewer => Phase::Plan,
            AgentId::Scaffolder | AgentId::Implementer | AgentId::Qa => Phase::Build,
            AgentId::Deployer | AgentId::Monitor => Phase::Deploy,
        }
    }

    /// True for the agent that gates (or terminates) its phase.
    pub fn is_gating(&self) -> bool {
        self.phase().gating_agent() == *self
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        AgentId::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| PipelineError::UnknownAgent(s.to_string()))
    }
}

/// Full roster for a project kind, in run order.
pub fn roster_for(kind: ProjectKind) -> Vec<AgentId> {
    AgentId::ALL
        .into_iter()
        .filter(|agent| match (agent, kind) {
            (AgentId::Discovery, ProjectKind::Existing) => false,
            (AgentId::CodebaseAnalyst, ProjectKind::Greenfield) => false,
            _ => true,
        })
        .collect()
}

/// Agents of a single phase, in run order.
pub fn phase_agents(kind: ProjectKind, phase: Phase) -> Vec<AgentId> {
    roster_for(kind)
        .into_iter()
        .filter(|a| a.phase() == phase)
        .collect()
}
