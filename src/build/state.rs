//! Build session and per-task checkpoint records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Abandoned,
}

impl BuildStatus {
    /// A terminal session is never resumed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Completed | BuildStatus::Abandoned)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Pending => write!(f, "pending"),
            BuildStatus::Running => write!(f, "running"),
            BuildStatus::Completed => write!(f, "completed"),
            BuildStatus::Failed => write!(f, "failed"),
            BuildStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointStatus::Pending => write!(f, "pending"),
            CheckpointStatus::InProgress => write!(f, "in_progress"),
            CheckpointStatus::Completed => write!(f, "completed"),
            CheckpointStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_id: String,
    pub status: CheckpointStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Checkpoint {
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: CheckpointStatus::Pending,
            attempts: 0,
            last_attempt: None,
            output: None,
            error: None,
        }
    }

    /// Completed or exhausted; the loop will not pick it again.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            CheckpointStatus::Completed | CheckpointStatus::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildState {
    pub session_id: Uuid,
    pub status: BuildStatus,
    pub checkpoints: Vec<Checkpoint>,
    pub total_attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BuildState {
    /// One pending checkpoint per task, in the given order.
    pub fn new<S: AsRef<str>>(task_ids: &[S]) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            status: BuildStatus::Pending,
            checkpoints: task_ids
                .iter()
                .map(|t| Checkpoint::pending(t.as_ref()))
                .collect(),
            total_attempts: 0,
            started_at: Utc::now(),
            last_checkpoint: None,
            completed_at: None,
        }
    }

    pub fn checkpoint(&self, task_id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.task_id == task_id)
    }

    /// Index of the first checkpoint still open for work.
    pub fn next_open(&self) -> Option<usize> {
        self.checkpoints.iter().position(|c| !c.is_settled())
    }

    pub fn count(&self, status: CheckpointStatus) -> usize {
        self.checkpoints.iter().filter(|c| c.status == status).count()
    }

    pub(crate) fn touch(&mut self) {
        self.last_checkpoint = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, status: BuildStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.touch();
    }
}

/// Keep at most `limit` characters of `s`.
pub fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_has_pending_checkpoints_in_order() {
        let state = BuildState::new(&["schema", "api", "ui"]);
        assert_eq!(state.status, BuildStatus::Pending);
        assert_eq!(state.total_attempts, 0);
        let ids: Vec<_> = state.checkpoints.iter().map(|c| c.task_id.as_str()).collect();
        assert_eq!(ids, vec!["schema", "api", "ui"]);
        assert!(state
            .checkpoints
            .iter()
            .all(|c| c.status == CheckpointStatus::Pending && c.attempts == 0));
    }

    #[test]
    fn test_next_open_skips_settled() {
        let mut state = BuildState::new(&["a", "b", "c"]);
        state.checkpoints[0].status = CheckpointStatus::Completed;
        state.checkpoints[1].status = CheckpointStatus::Failed;
        assert_eq!(state.next_open(), Some(2));
        state.checkpoints[2].status = CheckpointStatus::InProgress;
        assert_eq!(state.next_open(), Some(2));
        state.checkpoints[2].status = CheckpointStatus::Completed;
        assert_eq!(state.next_open(), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(BuildStatus::Completed.is_terminal());
        assert!(BuildStatus::Abandoned.is_terminal());
        assert!(!BuildStatus::Failed.is_terminal());
        assert!(!BuildStatus::Running.is_terminal());
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_serde_shape() {
        let state = BuildState::new(&["a"]);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["checkpoints"][0]["status"], "pending");
        assert!(json["checkpoints"][0].get("error").is_none());
    }
}
