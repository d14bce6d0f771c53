//! `conductor init`: create the `.conductor/` directory of a project.
//!
//! ```text
//! .conductor/
//! ├── conductor.toml   # project configuration
//! ├── pipeline.json    # pipeline state
//! └── logs/            # conductor.log and one log per terminal
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{CONDUCTOR_DIR, CONFIG_FILE, ConductorToml};
use crate::pipeline::{ProjectKind, init_pipeline};
use crate::store::{FileStore, PipelineStore};

#[derive(Debug)]
pub struct InitResult {
    pub conductor_dir: PathBuf,
    /// False when the directory already existed.
    pub created: bool,
    /// False when an existing pipeline record was kept.
    pub pipeline_created: bool,
}

/// Initialize a conductor project in `project_dir`.
///
/// Re-running completes a partial layout and never overwrites an existing
/// config or pipeline.
pub fn init_project(project_dir: &Path, kind: ProjectKind) -> Result<InitResult> {
    let conductor_dir = project_dir.join(CONDUCTOR_DIR);
    let created = !conductor_dir.exists();

    let log_dir = conductor_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create directory: {}", log_dir.display()))?;

    let config_file = conductor_dir.join(CONFIG_FILE);
    if !config_file.exists() {
        let mut toml = ConductorToml::default();
        toml.project.kind = kind;
        toml.save(&config_file)?;
    }

    let store = FileStore::new(&conductor_dir);
    let pipeline_created = match store.load_pipeline()? {
        Some(_) => false,
        None => {
            store.save_pipeline(&init_pipeline(kind))?;
            true
        }
    };

    Ok(InitResult {
        conductor_dir,
        created,
        pipeline_created,
    })
}

pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(CONDUCTOR_DIR).is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::AgentId;
    use tempfile::tempdir;

    #[test]
    fn test_init_project_creates_layout() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path(), ProjectKind::Greenfield).unwrap();

        assert!(result.created);
        assert!(result.pipeline_created);
        assert!(result.conductor_dir.join("logs").is_dir());
        assert!(result.conductor_dir.join("conductor.toml").exists());
        assert!(result.conductor_dir.join("pipeline.json").exists());
        assert!(is_initialized(dir.path()));
    }

    #[test]
    fn test_init_existing_project_kind() {
        let dir = tempdir().unwrap();
        init_project(dir.path(), ProjectKind::Existing).unwrap();

        let toml = ConductorToml::load_or_default(&dir.path().join(CONDUCTOR_DIR)).unwrap();
        assert_eq!(toml.project.kind, ProjectKind::Existing);

        let state = FileStore::for_project(dir.path())
            .load_pipeline()
            .unwrap()
            .unwrap();
        assert!(state.agents.contains_key(&AgentId::CodebaseAnalyst));
        assert!(!state.agents.contains_key(&AgentId::Discovery));
    }

    #[test]
    fn test_reinit_keeps_existing_records() {
        let dir = tempdir().unwrap();
        init_project(dir.path(), ProjectKind::Greenfield).unwrap();

        let store = FileStore::for_project(dir.path());
        let mut state = store.load_pipeline().unwrap().unwrap();
        state.current_agent = Some(AgentId::Researcher);
        store.save_pipeline(&state).unwrap();

        let result = init_project(dir.path(), ProjectKind::Existing).unwrap();
        assert!(!result.created);
        assert!(!result.pipeline_created);
        let kept = store.load_pipeline().unwrap().unwrap();
        assert_eq!(kept.current_agent, Some(AgentId::Researcher));
        assert_eq!(kept.project_kind, ProjectKind::Greenfield);
    }

    #[test]
    fn test_is_initialized_false_for_new_project() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));
    }
}
