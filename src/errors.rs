//! Typed error hierarchy for the conductor.
//!
//! One enum per subsystem:
//! - `PipelineError`: state machine argument validation
//! - `SpawnError`: spawn request validation, isolation and process start
//! - `BuildError`: build loop persistence
//! - `PreviewError`: preview server port probing and health checks

use thiserror::Error;

use crate::pipeline::{AgentId, Phase};

/// Errors from the pipeline state machine.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("Agent {agent} is not part of this pipeline's roster")]
    AgentNotInRoster { agent: AgentId },

    #[error("Agent {agent} belongs to a later phase; the pipeline is in {phase}")]
    PhaseNotReached { agent: AgentId, phase: Phase },

    #[error("Invalid preview decision '{0}'. Valid values: approve_keep, approve_kill, adjust, rethink")]
    InvalidPreviewDecision(String),

    #[error("Pipeline is in the {phase} phase and is not awaiting a preview decision")]
    NotAwaitingPreview { phase: Phase },

    #[error("Unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("Unknown project kind '{0}'. Valid values: greenfield, existing")]
    UnknownProjectKind(String),
}

/// Errors from building or spawning executor processes.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Spawn config is required")]
    MissingConfig,

    #[error("Spawn config is missing required field 'agent'")]
    MissingAgent,

    #[error("Spawn config for agent '{agent}' is missing required field 'task_id'")]
    MissingTaskId { agent: String },

    #[error("Unknown agent '{0}' in spawn config")]
    UnknownAgent(String),

    #[error("Unknown provider '{0}'. Valid values: claude, codex")]
    UnknownProvider(String),

    #[error("Write scope conflicts in spawn batch: {}", .conflicts.join("; "))]
    ScopeConflict { conflicts: Vec<String> },

    #[error("Failed to spawn {command} for terminal {terminal_id}: {source}")]
    SpawnFailed {
        command: String,
        terminal_id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the autonomous build loop.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Build task list is empty")]
    NoTasks,

    #[error("Failed to persist build state: {0}")]
    Persist(#[source] anyhow::Error),
}

/// Errors from the preview server helpers.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("No available port in {start}..{end} after {attempts} attempts")]
    NoPortAvailable { start: u16, end: u32, attempts: u16 },

    #[error("Preview server at {addr} not healthy after {waited_ms}ms")]
    HealthCheckTimeout { addr: String, waited_ms: u128 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_unknown_agent_carries_name() {
        let err = PipelineError::UnknownAgent("wizard".to_string());
        match &err {
            PipelineError::UnknownAgent(name) => assert_eq!(name, "wizard"),
            _ => panic!("Expected UnknownAgent"),
        }
        assert!(err.to_string().contains("wizard"));
    }

    #[test]
    fn spawn_error_scope_conflict_lists_all_conflicts() {
        let err = SpawnError::ScopeConflict {
            conflicts: vec!["a <-> b on src".into(), "c <-> d on docs".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("a <-> b on src"));
        assert!(msg.contains("c <-> d on docs"));
    }

    #[test]
    fn spawn_error_missing_fields_are_distinct() {
        let missing_config = SpawnError::MissingConfig;
        let missing_agent = SpawnError::MissingAgent;
        let missing_task = SpawnError::MissingTaskId {
            agent: "architect".into(),
        };
        assert!(matches!(missing_config, SpawnError::MissingConfig));
        assert!(matches!(missing_agent, SpawnError::MissingAgent));
        assert!(!matches!(missing_agent, SpawnError::MissingConfig));
        assert!(missing_task.to_string().contains("architect"));
    }

    #[test]
    fn build_error_wraps_anyhow_source() {
        let err = BuildError::Persist(anyhow::anyhow!("disk full"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&PipelineError::UnknownPhase("x".into()));
        assert_std_error(&SpawnError::MissingConfig);
        assert_std_error(&BuildError::NoTasks);
        assert_std_error(&PreviewError::NoPortAvailable {
            start: 3000,
            end: 3000,
            attempts: 0,
        });
    }
}
