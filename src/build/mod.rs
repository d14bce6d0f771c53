//! Checkpointed autonomous build loop.
//!
//! A build runs an ordered list of task ids through an injected
//! [`TaskExecutor`], retrying each failed task until it succeeds or exhausts
//! its attempts. Progress is checkpointed to a [`crate::store::BuildStore`].

pub mod runner;
pub mod state;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::store::{BuildStore, FileStore};

pub use runner::{
    BuildEvent, BuildLoopConfig, BuildRequest, BuildSummary, TaskExecutor, TaskOutcome,
    abandon_build, run_build_loop,
};
pub use state::{BuildState, BuildStatus, Checkpoint, CheckpointStatus, truncate_chars};

/// Read-only view of a persisted build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStatusSnapshot {
    pub session_id: Uuid,
    pub status: BuildStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub total_attempts: u32,
    pub started_at: DateTime<Utc>,
    pub last_checkpoint: Option<DateTime<Utc>>,
    pub checkpoints: Vec<Checkpoint>,
}

impl From<BuildState> for BuildStatusSnapshot {
    fn from(state: BuildState) -> Self {
        Self {
            session_id: state.session_id,
            status: state.status,
            total: state.checkpoints.len(),
            completed: state.count(CheckpointStatus::Completed),
            failed: state.count(CheckpointStatus::Failed),
            in_progress: state.count(CheckpointStatus::InProgress),
            pending: state.count(CheckpointStatus::Pending),
            total_attempts: state.total_attempts,
            started_at: state.started_at,
            last_checkpoint: state.last_checkpoint,
            checkpoints: state.checkpoints,
        }
    }
}

pub fn build_status<S: BuildStore + ?Sized>(store: &S) -> Result<Option<BuildStatusSnapshot>> {
    Ok(store.load_build()?.map(BuildStatusSnapshot::from))
}

/// Snapshot of `<project_dir>/.conductor/build-state.json`, if any.
pub fn get_build_status(project_dir: &Path) -> Result<Option<BuildStatusSnapshot>> {
    build_status(&FileStore::for_project(project_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_status_without_build() {
        let dir = tempdir().unwrap();
        assert!(get_build_status(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_status_counts() {
        let dir = tempdir().unwrap();
        let store = FileStore::for_project(dir.path());
        let mut state = BuildState::new(&["a", "b", "c", "d"]);
        state.status = BuildStatus::Running;
        state.checkpoints[0].status = CheckpointStatus::Completed;
        state.checkpoints[1].status = CheckpointStatus::Failed;
        state.checkpoints[2].status = CheckpointStatus::InProgress;
        store.save_build(&state).unwrap();

        let snapshot = get_build_status(dir.path()).unwrap().unwrap();
        assert_eq!(snapshot.status, BuildStatus::Running);
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.in_progress, 1);
        assert_eq!(snapshot.pending, 1);

        // Reading does not modify the record.
        assert_eq!(store.load_build().unwrap().unwrap(), state);
    }
}
