//! Project configuration read from `.conductor/conductor.toml`.
//!
//! Layering is file → environment → CLI. A missing file yields defaults.
//!
//! ```toml
//! [project]
//! kind = "greenfield"
//!
//! [gates]
//! threshold = 95
//! mode = "autonomous"
//!
//! [gates.criteria.requirements]
//! artifacts = [{ path = "docs/requirements.md", critical = true }]
//!
//! [spawn]
//! provider = "claude"
//! command = "claude"
//! kill_grace_ms = 5000
//!
//! [build]
//! max_attempts = 3
//! timeout_secs = 1800
//!
//! [preview]
//! port = 3000
//! port_attempts = 20
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::build::BuildLoopConfig;
use crate::gates::{ArtifactCriterion, ArtifactGate, GateMode};
use crate::pipeline::{AgentId, PHASE_THRESHOLD, ProjectKind};

pub const CONDUCTOR_DIR: &str = ".conductor";
pub const CONFIG_FILE: &str = "conductor.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: ProjectKind,
}

/// Artifacts an agent is expected to leave behind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCriteria {
    #[serde(default)]
    pub artifacts: Vec<ArtifactCriterion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatesSection {
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default)]
    pub mode: GateMode,
    /// Keyed by agent id, e.g. `[gates.criteria.plan-reviewer]`.
    #[serde(default)]
    pub criteria: BTreeMap<String, AgentCriteria>,
}

fn default_threshold() -> u8 {
    PHASE_THRESHOLD
}

impl Default for GatesSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            mode: GateMode::default(),
            criteria: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnSection {
    #[serde(default)]
    pub provider: Option<String>,
    /// Override of the provider's program.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
}

fn default_kill_grace_ms() -> u64 {
    5000
}

fn default_skip_permissions() -> bool {
    true
}

impl Default for SpawnSection {
    fn default() -> Self {
        Self {
            provider: None,
            command: None,
            kill_grace_ms: default_kill_grace_ms(),
            skip_permissions: default_skip_permissions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30 * 60
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSection {
    #[serde(default = "default_preview_port")]
    pub port: u16,
    #[serde(default = "default_port_attempts")]
    pub port_attempts: u16,
}

fn default_preview_port() -> u16 {
    3000
}

fn default_port_attempts() -> u16 {
    20
}

impl Default for PreviewSection {
    fn default() -> Self {
        Self {
            port: default_preview_port(),
            port_attempts: default_port_attempts(),
        }
    }
}

/// The complete conductor.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub gates: GatesSection,
    #[serde(default)]
    pub spawn: SpawnSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub preview: PreviewSection,
}

impl ConductorToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse conductor.toml")
    }

    /// Load `<conductor_dir>/conductor.toml`, or defaults when it is absent.
    pub fn load_or_default(conductor_dir: &Path) -> Result<Self> {
        let path = conductor_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize conductor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Provider name (file → `CONDUCTOR_PROVIDER` → "claude").
    pub fn provider(&self) -> String {
        self.spawn
            .provider
            .clone()
            .or_else(|| std::env::var("CONDUCTOR_PROVIDER").ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Program override (file → `CONDUCTOR_CMD`).
    pub fn command(&self) -> Option<String> {
        self.spawn
            .command
            .clone()
            .or_else(|| std::env::var("CONDUCTOR_CMD").ok())
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.spawn.kill_grace_ms)
    }

    pub fn build_loop_config(&self) -> BuildLoopConfig {
        BuildLoopConfig {
            max_attempts: self.build.max_attempts,
            timeout: Duration::from_secs(self.build.timeout_secs),
            ..BuildLoopConfig::default()
        }
    }

    /// Artifact gate for `agent`, or `None` when no criteria are configured.
    pub fn artifact_gate(&self, agent: AgentId) -> Option<ArtifactGate> {
        let criteria = self.gates.criteria.get(agent.as_str())?;
        Some(
            ArtifactGate::new(agent.as_str(), criteria.artifacts.clone())
                .with_threshold(self.gates.threshold),
        )
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.gates.threshold > 100 {
            warnings.push(format!(
                "gates.threshold {} is above 100; no gate can pass",
                self.gates.threshold
            ));
        }
        if self.build.max_attempts == 0 {
            warnings.push("build.max_attempts is 0; every task will be exhausted".to_string());
        }
        if self.build.timeout_secs == 0 {
            warnings.push("build.timeout_secs is 0; every attempt will time out".to_string());
        }
        for key in self.gates.criteria.keys() {
            if key.parse::<AgentId>().is_err() {
                warnings.push(format!("gates.criteria.{key} does not name a known agent"));
            }
        }
        if let Some(provider) = &self.spawn.provider
            && !matches!(provider.to_lowercase().as_str(), "claude" | "codex")
        {
            warnings.push(format!("Unknown spawn.provider '{provider}'"));
        }

        warnings
    }
}

/// Resolved configuration for one project directory.
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    pub project_dir: PathBuf,
    pub conductor_dir: PathBuf,
    pub toml: ConductorToml,
    pub verbose: bool,
}

impl ConductorConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let conductor_dir = project_dir.join(CONDUCTOR_DIR);
        let toml = ConductorToml::load_or_default(&conductor_dir)?;

        Ok(Self {
            project_dir,
            conductor_dir,
            toml,
            verbose: false,
        })
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.conductor_dir.is_dir()
    }

    pub fn config_file(&self) -> PathBuf {
        self.conductor_dir.join(CONFIG_FILE)
    }

    pub fn pipeline_file(&self) -> PathBuf {
        self.conductor_dir.join("pipeline.json")
    }

    pub fn build_state_file(&self) -> PathBuf {
        self.conductor_dir.join("build-state.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.conductor_dir.join("logs")
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let toml = ConductorToml::default();
        assert_eq!(toml.project.kind, ProjectKind::Greenfield);
        assert_eq!(toml.gates.threshold, 95);
        assert_eq!(toml.gates.mode, GateMode::Autonomous);
        assert_eq!(toml.build.max_attempts, 3);
        assert_eq!(toml.build.timeout_secs, 1800);
        assert_eq!(toml.kill_grace(), Duration::from_secs(5));
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let content = r#"
[project]
kind = "existing"

[gates]
threshold = 90
mode = "human_in_the_loop"

[gates.criteria.requirements]
artifacts = [
    { path = "docs/requirements.md", critical = true },
    { path = "docs/personas.md", weight = 2 },
]

[spawn]
provider = "codex"
command = "/usr/local/bin/codex"
kill_grace_ms = 250

[build]
max_attempts = 5
timeout_secs = 60
"#;
        let toml = ConductorToml::parse(content).unwrap();
        assert_eq!(toml.project.kind, ProjectKind::Existing);
        assert_eq!(toml.gates.mode, GateMode::HumanInTheLoop);
        assert_eq!(toml.provider(), "codex");
        assert_eq!(toml.command().as_deref(), Some("/usr/local/bin/codex"));
        assert_eq!(toml.kill_grace(), Duration::from_millis(250));

        let build = toml.build_loop_config();
        assert_eq!(build.max_attempts, 5);
        assert_eq!(build.timeout, Duration::from_secs(60));

        let gate = toml.artifact_gate(AgentId::Requirements).unwrap();
        assert_eq!(gate.criteria().len(), 2);
        assert!(gate.criteria()[0].critical);
        assert_eq!(gate.criteria()[1].weight, 2);
        assert!(toml.artifact_gate(AgentId::Qa).is_none());
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(ConductorToml::parse("[gates\nthreshold = ").is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let content = r#"
[gates]
threshold = 120

[gates.criteria.wizard]
artifacts = []

[build]
max_attempts = 0
"#;
        let warnings = ConductorToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("threshold")));
        assert!(warnings.iter().any(|w| w.contains("wizard")));
        assert!(warnings.iter().any(|w| w.contains("max_attempts")));
    }

    #[test]
    fn test_provider_env_fallback() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = std::env::var("CONDUCTOR_PROVIDER").ok();

        unsafe { std::env::remove_var("CONDUCTOR_PROVIDER") };
        assert_eq!(ConductorToml::default().provider(), "claude");

        unsafe { std::env::set_var("CONDUCTOR_PROVIDER", "codex") };
        assert_eq!(ConductorToml::default().provider(), "codex");

        // File wins over environment.
        let toml = ConductorToml::parse("[spawn]\nprovider = \"claude\"").unwrap();
        assert_eq!(toml.provider(), "claude");

        match saved {
            Some(val) => unsafe { std::env::set_var("CONDUCTOR_PROVIDER", val) },
            None => unsafe { std::env::remove_var("CONDUCTOR_PROVIDER") },
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let mut toml = ConductorToml::default();
        toml.project.kind = ProjectKind::Existing;
        toml.build.max_attempts = 7;
        toml.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let loaded = ConductorToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.project.kind, ProjectKind::Existing);
        assert_eq!(loaded.build.max_attempts, 7);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let toml = ConductorToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.gates.threshold, 95);
    }

    #[test]
    fn test_conductor_config_paths() {
        let dir = tempdir().unwrap();
        let config = ConductorConfig::new(dir.path().to_path_buf()).unwrap();
        assert!(!config.is_initialized());
        assert!(config.pipeline_file().ends_with(".conductor/pipeline.json"));
        assert!(config.build_state_file().ends_with(".conductor/build-state.json"));
        assert!(config.log_dir().ends_with(".conductor/logs"));
    }
}
