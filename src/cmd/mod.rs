//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                                           |
//! |------------|------------------------------------------------------------|
//! | `project`  | `Init`, `Status`                                           |
//! | `pipeline` | `Start`, `Complete`, `Gate`, `Approve`, `Preview`, `Reset` |
//! | `spawn`    | `Spawn`                                                    |
//! | `build`    | `Build`, `BuildStatus`                                     |
//! | `config`   | `Config`                                                   |

pub mod build;
pub mod config;
pub mod pipeline;
pub mod project;
pub mod spawn;

pub use build::{cmd_build, cmd_build_status};
pub use config::cmd_config;
pub use pipeline::{cmd_approve, cmd_complete, cmd_gate, cmd_preview, cmd_reset, cmd_start};
pub use project::{cmd_init, cmd_status};
pub use spawn::cmd_spawn;

use anyhow::{Result, bail};
use std::path::Path;

use conductor::config::ConductorConfig;
use conductor::init::is_initialized;
use conductor::orchestrator::Orchestrator;
use conductor::store::FileStore;

/// Open the orchestrator for an initialized project.
pub(crate) fn open_orchestrator(project_dir: &Path) -> Result<Orchestrator<FileStore>> {
    if !is_initialized(project_dir) {
        bail!("Not a conductor project. Run `conductor init` first.");
    }
    let config = ConductorConfig::new(project_dir.to_path_buf())?;
    Orchestrator::open(config)
}
