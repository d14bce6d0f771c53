//! Lifecycle of spawned executor processes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Child;

use crate::pipeline::AgentId;

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Id reported for a status query without a handle.
pub const UNKNOWN_TERMINAL: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Running,
    Exited,
    Unknown,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::Running => write!(f, "running"),
            TerminalState::Exited => write!(f, "exited"),
            TerminalState::Unknown => write!(f, "unknown"),
        }
    }
}

/// A spawned executor. Owns the child process while it runs.
#[derive(Debug)]
pub struct TerminalHandle {
    pub id: String,
    pub agent: AgentId,
    pub task_id: String,
    pub status: TerminalState,
    pub started_at: DateTime<Utc>,
    /// Set once the process is observed to exit; stops the elapsed clock.
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    child: Option<Child>,
}

impl TerminalHandle {
    pub(crate) fn running(id: String, agent: AgentId, task_id: String, child: Child) -> Self {
        Self {
            id,
            agent,
            task_id,
            status: TerminalState::Running,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            child: Some(child),
        }
    }

    /// A handle with no process attached, e.g. one rebuilt from a record.
    pub fn detached(id: impl Into<String>, agent: AgentId, task_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent,
            task_id: task_id.into(),
            status: TerminalState::Running,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            child: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    pub fn has_process(&self) -> bool {
        self.child.is_some()
    }

    fn mark_exited(&mut self, exit_code: Option<i32>) {
        self.status = TerminalState::Exited;
        self.exit_code = exit_code;
        self.finished_at.get_or_insert_with(Utc::now);
        self.child = None;
    }

    /// Poll the child without blocking and update the status.
    pub fn refresh(&mut self) -> TerminalState {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => self.mark_exited(status.code()),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(terminal = %self.id, error = %e, "failed to poll terminal");
                }
            }
        }
        self.status
    }

    /// Wait for the child to exit. Returns the exit code, if any.
    pub async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        if let Some(child) = self.child.as_mut() {
            let status = child.wait().await?;
            self.mark_exited(status.code());
        }
        Ok(self.exit_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalStatus {
    pub id: String,
    pub agent: Option<AgentId>,
    pub status: TerminalState,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

pub fn get_terminal_status(handle: Option<&TerminalHandle>) -> TerminalStatus {
    let Some(handle) = handle else {
        return TerminalStatus {
            id: UNKNOWN_TERMINAL.to_string(),
            agent: None,
            status: TerminalState::Unknown,
            exit_code: None,
            elapsed: Duration::ZERO,
        };
    };
    TerminalStatus {
        id: handle.id.clone(),
        agent: Some(handle.agent),
        status: handle.status,
        exit_code: handle.exit_code,
        elapsed: (handle.finished_at.unwrap_or_else(Utc::now) - handle.started_at)
            .to_std()
            .unwrap_or_default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillResult {
    pub killed: bool,
    pub exit_code: Option<i32>,
}

/// Terminate a terminal: SIGTERM, wait up to `grace`, then SIGKILL.
///
/// A missing handle, a handle without a process, or an already exited
/// process is a no-op reporting `killed: false`.
pub async fn kill_terminal(handle: Option<&mut TerminalHandle>, grace: Duration) -> KillResult {
    let Some(handle) = handle else {
        return KillResult {
            killed: false,
            exit_code: None,
        };
    };
    if handle.refresh() == TerminalState::Exited {
        return KillResult {
            killed: false,
            exit_code: handle.exit_code,
        };
    }
    let Some(child) = handle.child.as_mut() else {
        return KillResult {
            killed: false,
            exit_code: handle.exit_code,
        };
    };

    if !send_terminate(child) {
        tracing::debug!(terminal = %handle.id, "SIGTERM not delivered");
    }

    let status = match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            tracing::warn!(terminal = %handle.id, error = %e, "wait after SIGTERM failed");
            None
        }
        Err(_) => {
            tracing::warn!(
                terminal = %handle.id,
                grace_ms = grace.as_millis() as u64,
                "terminal ignored SIGTERM, sending SIGKILL"
            );
            if let Err(e) = child.kill().await {
                tracing::warn!(terminal = %handle.id, error = %e, "SIGKILL failed");
            }
            child.wait().await.ok()
        }
    };

    let exit_code = status.and_then(|s| s.code());
    handle.mark_exited(exit_code);
    tracing::info!(terminal = %handle.id, ?exit_code, "terminal killed");
    KillResult {
        killed: true,
        exit_code,
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok(),
        None => false,
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> bool {
    child.start_kill().is_ok()
}
