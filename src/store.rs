//! Persistence for the pipeline and build records.
//!
//! Each record is a single JSON document rewritten in full on every save.
//! Writes go through a sibling temp file and a rename so a crash mid-write
//! leaves the previous record intact. Concurrent writers are not coordinated.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use crate::build::BuildState;
use crate::config::CONDUCTOR_DIR;
use crate::pipeline::PipelineState;

pub const PIPELINE_FILE: &str = "pipeline.json";
pub const BUILD_STATE_FILE: &str = "build-state.json";

pub trait PipelineStore {
    fn load_pipeline(&self) -> Result<Option<PipelineState>>;
    fn save_pipeline(&self, state: &PipelineState) -> Result<()>;
}

pub trait BuildStore {
    fn load_build(&self) -> Result<Option<BuildState>>;
    fn save_build(&self, state: &BuildState) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at an explicit directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `<project_dir>/.conductor`.
    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join(CONDUCTOR_DIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pipeline_path(&self) -> PathBuf {
        self.dir.join(PIPELINE_FILE)
    }

    pub fn build_path(&self) -> PathBuf {
        self.dir.join(BUILD_STATE_FILE)
    }
}

impl PipelineStore for FileStore {
    fn load_pipeline(&self) -> Result<Option<PipelineState>> {
        read_json(&self.pipeline_path())
    }

    fn save_pipeline(&self, state: &PipelineState) -> Result<()> {
        write_json(&self.pipeline_path(), state)
    }
}

impl BuildStore for FileStore {
    fn load_build(&self) -> Result<Option<BuildState>> {
        read_json(&self.build_path())
    }

    fn save_build(&self, state: &BuildState) -> Result<()> {
        write_json(&self.build_path(), state)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
