//! Executor spawner.
//!
//! Turns a [`SpawnConfig`] into a fully resolved [`SpawnCommand`] and starts
//! it as an isolated OS process. Batches are validated for write-scope
//! conflicts and every command is built before the first process starts, so a
//! rejected batch never leaves stray executors behind.
//!
//! | Variable                 | Value                                  |
//! |--------------------------|----------------------------------------|
//! | `CONDUCTOR_AGENT_ID`     | agent id, e.g. `architect`             |
//! | `CONDUCTOR_TASK_ID`      | caller supplied task id                |
//! | `CONDUCTOR_TERMINAL_ID`  | `<agent>-<n>`                          |
//! | `CONDUCTOR_WRITE_SCOPE`  | comma separated path prefixes          |
//! | `CONDUCTOR_READ_SCOPE`   | `*`                                    |
//! | `CONDUCTOR_CONTEXT`      | JSON context payload, `{}` when absent |

pub mod env;
pub mod provider;
pub mod scope;
pub mod terminal;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::ConductorToml;
use crate::errors::SpawnError;
use crate::pipeline::AgentId;

pub use env::clean_parent_env;
pub use provider::{ClaudeProvider, CodexProvider, ModelTier, Provider, provider_for_name};
pub use scope::{
    ScopeConflict, ScopeValidation, WriteScope, resolve_scope, scope_for_agent,
    validate_write_scopes,
};
pub use terminal::{
    DEFAULT_KILL_GRACE, KillResult, TerminalHandle, TerminalState, TerminalStatus,
    get_terminal_status, kill_terminal,
};

/// A request to run one agent on one task.
///
/// `agent` and `task_id` are optional so that a malformed request is
/// reported instead of defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub write_scope: Option<WriteScope>,
    /// Tier (`fast`, `balanced`, `powerful`) or a literal model id.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub context_payload: Option<serde_json::Value>,
    /// Delivered on stdin, never on the command line.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl SpawnConfig {
    pub fn new(agent: AgentId, task_id: &str) -> Self {
        Self {
            agent: Some(agent.as_str().to_string()),
            task_id: Some(task_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_context(mut self, payload: serde_json::Value) -> Self {
        self.context_payload = Some(payload);
        self
    }

    pub fn with_write_scope(mut self, scope: WriteScope) -> Self {
        self.write_scope = Some(scope);
        self
    }
}

/// Fully resolved invocation, ready to launch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnCommand {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub terminal_id: String,
    pub agent: AgentId,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug)]
pub struct Spawner {
    provider: Box<dyn Provider>,
    working_dir: PathBuf,
    log_dir: Option<PathBuf>,
    parent_env: BTreeMap<String, String>,
    kill_grace: Duration,
    next_terminal: AtomicU64,
}

impl Spawner {
    pub fn new(provider: Box<dyn Provider>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            working_dir: working_dir.into(),
            log_dir: None,
            parent_env: env::current_env(),
            kill_grace: DEFAULT_KILL_GRACE,
            next_terminal: AtomicU64::new(0),
        }
    }

    /// Spawner configured from `[spawn]` with env fallbacks applied.
    pub fn from_config(toml: &ConductorToml, working_dir: &Path) -> Result<Self, SpawnError> {
        let command = toml.command();
        let provider = provider_for_name(
            &toml.provider(),
            command.as_deref(),
            toml.spawn.skip_permissions,
        )?;
        Ok(Self::new(provider, working_dir).with_kill_grace(toml.kill_grace()))
    }

    /// Replace the parent environment the child env is derived from.
    pub fn with_parent_env(mut self, parent_env: BTreeMap<String, String>) -> Self {
        self.parent_env = parent_env;
        self
    }

    /// Write each terminal's stdout and stderr to `<log_dir>/<terminal_id>.log`.
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn kill_grace(&self) -> Duration {
        self.kill_grace
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// Restart terminal numbering at 1.
    pub fn reset_terminal_ids(&self) {
        self.next_terminal.store(0, Ordering::SeqCst);
    }

    fn next_terminal_id(&self, agent: AgentId) -> String {
        let n = self.next_terminal.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{agent}-{n}")
    }

    pub fn build_spawn_command(
        &self,
        config: Option<&SpawnConfig>,
    ) -> Result<SpawnCommand, SpawnError> {
        let config = config.ok_or(SpawnError::MissingConfig)?;
        let agent_name = config
            .agent
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(SpawnError::MissingAgent)?;
        let task_id = config
            .task_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SpawnError::MissingTaskId {
                agent: agent_name.to_string(),
            })?;
        let agent: AgentId = agent_name
            .parse()
            .map_err(|_| SpawnError::UnknownAgent(agent_name.to_string()))?;

        let write_scope = config
            .write_scope
            .clone()
            .unwrap_or_else(|| scope_for_agent(agent));
        let terminal_id = self.next_terminal_id(agent);

        let context = match &config.context_payload {
            Some(payload) => serde_json::to_string(payload).unwrap_or_else(|e| {
                tracing::warn!(terminal = %terminal_id, error = %e, "context payload not serializable");
                "{}".to_string()
            }),
            None => "{}".to_string(),
        };

        let mut env = clean_parent_env(&self.parent_env);
        env.insert("CONDUCTOR_CONTEXT".into(), context);
        env.insert("CONDUCTOR_AGENT_ID".into(), agent.as_str().to_string());
        env.insert("CONDUCTOR_TASK_ID".into(), task_id.to_string());
        env.insert("CONDUCTOR_TERMINAL_ID".into(), terminal_id.clone());
        env.insert("CONDUCTOR_WRITE_SCOPE".into(), write_scope.descriptor());
        env.insert("CONDUCTOR_READ_SCOPE".into(), scope::UNRESTRICTED.to_string());

        let args = self.provider.build_args(config.model.as_deref());

        tracing::debug!(
            terminal = %terminal_id,
            provider = self.provider.name(),
            ?args,
            write_scope = %write_scope,
            "built spawn command"
        );

        Ok(SpawnCommand {
            command: self.provider.program().to_string(),
            args,
            env,
            terminal_id,
            agent,
            task_id: task_id.to_string(),
            prompt: config.prompt.clone(),
        })
    }

    /// Spawn a single executor.
    pub async fn spawn(&self, config: &SpawnConfig) -> Result<TerminalHandle, SpawnError> {
        let command = self.build_spawn_command(Some(config))?;
        self.launch(command).await
    }

    /// Spawn a batch of executors with disjoint write scopes.
    pub async fn spawn_batch(
        &self,
        configs: &[SpawnConfig],
    ) -> Result<Vec<TerminalHandle>, SpawnError> {
        let validation = validate_write_scopes(configs);
        if !validation.valid {
            let conflicts: Vec<String> =
                validation.conflicts.iter().map(ToString::to_string).collect();
            tracing::warn!(?conflicts, "rejecting spawn batch");
            return Err(SpawnError::ScopeConflict { conflicts });
        }

        let commands = configs
            .iter()
            .map(|c| self.build_spawn_command(Some(c)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut handles = Vec::with_capacity(commands.len());
        for command in commands {
            match self.launch(command).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for mut started in handles {
                        kill_terminal(Some(&mut started), self.kill_grace).await;
                    }
                    return Err(e);
                }
            }
        }
        tracing::info!(count = handles.len(), "spawned batch");
        Ok(handles)
    }

    async fn launch(&self, spawn: SpawnCommand) -> Result<TerminalHandle, SpawnError> {
        let spawn_failed = |source: std::io::Error| SpawnError::SpawnFailed {
            command: spawn.command.clone(),
            terminal_id: spawn.terminal_id.clone(),
            source,
        };

        let mut cmd = Command::new(&spawn.command);
        cmd.args(&spawn.args)
            .env_clear()
            .envs(&spawn.env)
            .current_dir(&self.working_dir)
            .stdin(if spawn.prompt.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        match &self.log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(spawn_failed)?;
                let log = std::fs::File::create(dir.join(format!("{}.log", spawn.terminal_id)))
                    .map_err(spawn_failed)?;
                let err_log = log.try_clone().map_err(spawn_failed)?;
                cmd.stdout(log).stderr(err_log);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let mut child = cmd.spawn().map_err(spawn_failed)?;

        if let Some(prompt) = spawn.prompt.clone()
            && let Some(mut stdin) = child.stdin.take()
        {
            let terminal_id = spawn.terminal_id.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    tracing::warn!(terminal = %terminal_id, error = %e, "failed to write prompt");
                }
                // Dropping stdin closes it so the executor sees EOF.
            });
        }

        tracing::info!(
            terminal = %spawn.terminal_id,
            agent = %spawn.agent,
            task = %spawn.task_id,
            pid = child.id(),
            "spawned executor"
        );
        Ok(TerminalHandle::running(
            spawn.terminal_id,
            spawn.agent,
            spawn.task_id,
            child,
        ))
    }
}
