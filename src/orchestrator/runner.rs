use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::build::{TaskExecutor, TaskOutcome};
use crate::pipeline::AgentId;
use crate::spawn::{SpawnConfig, Spawner};

/// Runs each build task as one executor process of a fixed agent.
///
/// A task succeeds when the executor exits with status 0. The executor's log
/// becomes the task output when the spawner writes logs.
pub struct AgentTaskExecutor<'a> {
    spawner: &'a Spawner,
    agent: AgentId,
    model: Option<String>,
}

impl<'a> AgentTaskExecutor<'a> {
    pub fn new(spawner: &'a Spawner, agent: AgentId) -> Self {
        Self {
            spawner,
            agent,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    fn spawn_config(&self, task_id: &str) -> SpawnConfig {
        let mut config = SpawnConfig::new(self.agent, task_id)
            .with_prompt(format!("Build task: {task_id}"))
            .with_context(json!({ "task_id": task_id, "agent": self.agent }));
        config.model = self.model.clone();
        config
    }
}

#[async_trait]
impl TaskExecutor for AgentTaskExecutor<'_> {
    async fn execute(&self, task_id: &str) -> Result<TaskOutcome> {
        let mut handle = self
            .spawner
            .spawn(&self.spawn_config(task_id))
            .await
            .with_context(|| format!("Failed to start executor for task {task_id}"))?;
        let exit_code = handle
            .wait()
            .await
            .with_context(|| format!("Failed waiting on terminal {}", handle.id))?;

        let log = match self.spawner.log_dir() {
            Some(dir) => std::fs::read_to_string(dir.join(format!("{}.log", handle.id)))
                .unwrap_or_default(),
            None => String::new(),
        };
        let output = if log.trim().is_empty() {
            format!("terminal {} exited with {:?}", handle.id, exit_code)
        } else {
            log
        };

        Ok(TaskOutcome {
            success: exit_code == Some(0),
            output,
        })
    }
}
