//! The autonomous build loop.
//!
//! One task in flight at a time. The loop persists the whole [`BuildState`]
//! after every mutation, so a crashed run resumes from its last checkpoint.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

use super::state::{BuildState, BuildStatus, Checkpoint, CheckpointStatus, truncate_chars};
use crate::errors::BuildError;
use crate::store::BuildStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLoopConfig {
    /// Executions allowed per task before it is marked exhausted.
    pub max_attempts: u32,
    /// Budget for one loop invocation, measured from its start.
    pub timeout: Duration,
    pub output_limit: usize,
    pub error_limit: usize,
}

impl Default for BuildLoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30 * 60),
            output_limit: 2000,
            error_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    pub task_ids: Vec<String>,
    /// Continue a non-terminal session from the store instead of starting over.
    pub resume: bool,
}

impl BuildRequest {
    pub fn new<S: AsRef<str>>(task_ids: &[S]) -> Self {
        Self {
            task_ids: task_ids.iter().map(|t| t.as_ref().to_string()).collect(),
            resume: false,
        }
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub output: String,
}

impl TaskOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Runs one task. An `Err` is treated the same as a failed outcome.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task_id: &str) -> Result<TaskOutcome>;
}

#[async_trait]
impl<F, Fut> TaskExecutor for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskOutcome>> + Send + 'static,
{
    async fn execute(&self, task_id: &str) -> Result<TaskOutcome> {
        (self)(task_id.to_string()).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    TaskStarted { task_id: String, attempt: u32 },
    TaskCompleted { task_id: String, attempt: u32 },
    TaskFailed {
        task_id: String,
        attempt: u32,
        error: String,
    },
    TaskExhausted { task_id: String, attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub status: BuildStatus,
    pub completed: usize,
    pub failed: usize,
    pub total_attempts: u32,
    pub duration: Duration,
}

fn persist<S: BuildStore + ?Sized>(store: &S, state: &BuildState) -> Result<(), BuildError> {
    store.save_build(state).map_err(BuildError::Persist)
}

pub async fn run_build_loop<S, E, F>(
    store: &S,
    request: &BuildRequest,
    config: &BuildLoopConfig,
    executor: &E,
    mut on_progress: F,
) -> Result<BuildSummary, BuildError>
where
    S: BuildStore + ?Sized,
    E: TaskExecutor + ?Sized,
    F: FnMut(&BuildEvent),
{
    let clock = Instant::now();

    let existing = if request.resume {
        store.load_build().map_err(BuildError::Persist)?
    } else {
        None
    };
    let mut state = match existing {
        Some(state) if !state.status.is_terminal() => {
            tracing::info!(session = %state.session_id, "resuming build");
            state
        }
        _ => {
            if request.task_ids.is_empty() {
                return Err(BuildError::NoTasks);
            }
            BuildState::new(&request.task_ids)
        }
    };

    state.status = BuildStatus::Running;
    state.completed_at = None;
    state.touch();
    persist(store, &state)?;

    loop {
        if clock.elapsed() >= config.timeout {
            tracing::warn!(
                session = %state.session_id,
                timeout_secs = config.timeout.as_secs(),
                "build timed out"
            );
            state.finish(BuildStatus::Failed);
            persist(store, &state)?;
            break;
        }

        let Some(idx) = state.next_open() else {
            let status = if state.count(CheckpointStatus::Failed) == 0 {
                BuildStatus::Completed
            } else {
                BuildStatus::Failed
            };
            state.finish(status);
            persist(store, &state)?;
            break;
        };

        let checkpoint = &mut state.checkpoints[idx];
        let task_id = checkpoint.task_id.clone();

        if checkpoint.attempts >= config.max_attempts {
            checkpoint.status = CheckpointStatus::Failed;
            let attempts = checkpoint.attempts;
            tracing::warn!(task = %task_id, attempts, "task exhausted");
            state.touch();
            persist(store, &state)?;
            on_progress(&BuildEvent::TaskExhausted { task_id, attempts });
            continue;
        }

        checkpoint.status = CheckpointStatus::InProgress;
        checkpoint.attempts += 1;
        checkpoint.last_attempt = Some(Utc::now());
        let attempt = checkpoint.attempts;
        state.total_attempts += 1;
        state.touch();
        persist(store, &state)?;
        on_progress(&BuildEvent::TaskStarted {
            task_id: task_id.clone(),
            attempt,
        });

        let result = executor.execute(&task_id).await;
        let checkpoint: &mut Checkpoint = &mut state.checkpoints[idx];
        let event = match result {
            Ok(outcome) if outcome.success => {
                checkpoint.status = CheckpointStatus::Completed;
                checkpoint.output = Some(truncate_chars(&outcome.output, config.output_limit));
                checkpoint.error = None;
                tracing::info!(task = %task_id, attempt, "task completed");
                BuildEvent::TaskCompleted { task_id, attempt }
            }
            Ok(outcome) => {
                let error = truncate_chars(&outcome.output, config.error_limit);
                checkpoint.error = Some(error.clone());
                tracing::warn!(task = %task_id, attempt, "task failed");
                BuildEvent::TaskFailed {
                    task_id,
                    attempt,
                    error,
                }
            }
            Err(e) => {
                let error = truncate_chars(&format!("{e:#}"), config.error_limit);
                checkpoint.error = Some(error.clone());
                tracing::warn!(task = %task_id, attempt, error = %error, "task errored");
                BuildEvent::TaskFailed {
                    task_id,
                    attempt,
                    error,
                }
            }
        };
        state.touch();
        persist(store, &state)?;
        on_progress(&event);
    }

    let summary = BuildSummary {
        status: state.status,
        completed: state.count(CheckpointStatus::Completed),
        failed: state.count(CheckpointStatus::Failed),
        total_attempts: state.total_attempts,
        duration: clock.elapsed(),
    };
    tracing::info!(
        session = %state.session_id,
        status = %summary.status,
        completed = summary.completed,
        failed = summary.failed,
        "build finished"
    );
    Ok(summary)
}

/// Mark a non-terminal session abandoned. Returns whether anything changed.
pub fn abandon_build<S: BuildStore + ?Sized>(store: &S) -> Result<bool> {
    match store.load_build()? {
        Some(mut state) if !state.status.is_terminal() => {
            state.finish(BuildStatus::Abandoned);
            store.save_build(&state)?;
            tracing::info!(session = %state.session_id, "build abandoned");
            Ok(true)
        }
        _ => Ok(false),
    }
}
