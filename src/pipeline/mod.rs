//! Pipeline state machine.
//!
//! The pipeline is an explicit [`PipelineState`] value threaded through pure
//! transition functions. Nothing here touches disk; callers persist through a
//! [`crate::store::PipelineStore`].

pub mod roster;
pub mod state;
pub mod transition;

pub use roster::{AgentId, PHASE_THRESHOLD, Phase, ProjectKind, phase_agents, roster_for};
pub use state::{
    AgentRecord, AgentStatus, HistoryAction, HistoryEntry, ModeTransition, PipelineState,
    TransitionTrigger,
};
pub use transition::{
    AdvanceOutcome, AgentResult, NextAction, PhaseTransitionCheck, PipelineProgress,
    PreviewContext, PreviewDecision, advance_pipeline, advance_pipeline_with_threshold,
    check_phase_transition, check_phase_transition_with_threshold, confirm_preview,
    get_pipeline_progress, init_pipeline, mark_agent_in_progress, reset_pipeline_to,
};
