use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Agent pipeline orchestrator with quality gates")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new conductor project
    Init {
        /// Start from codebase analysis instead of discovery
        #[arg(long)]
        existing: bool,
    },
    /// Show pipeline phase, agent statuses and progress
    Status,
    /// Mark an agent as in progress
    Start { agent: String },
    /// Record an agent's result and advance the pipeline
    Complete {
        agent: String,

        /// Quality score (0-100)
        #[arg(long)]
        score: u8,

        /// The agent reported a critical blocker
        #[arg(long)]
        critical: bool,
    },
    /// Evaluate the configured artifact gate for an agent
    Gate {
        agent: String,

        /// Record the result and wait for `conductor approve`
        #[arg(long)]
        human: bool,
    },
    /// Approve a waiting human-in-the-loop gate
    Approve {
        agent: String,

        #[arg(long)]
        score: u8,
    },
    /// Resolve the user preview: approve-keep, approve-kill, adjust, rethink
    Preview { decision: Option<String> },
    /// Rewind the pipeline to an agent
    Reset { agent: String },
    /// Spawn an executor for one agent task
    Spawn {
        #[arg(long)]
        agent: String,

        #[arg(long)]
        task: String,

        /// Model tier (fast, balanced, powerful) or a literal model id
        #[arg(long)]
        model: Option<String>,

        /// Prompt written to the executor's stdin
        #[arg(long)]
        prompt: Option<String>,

        /// Print the resolved command without starting it
        #[arg(long)]
        dry_run: bool,
    },
    /// Run build tasks through the autonomous retry loop
    Build {
        #[arg(long = "task")]
        tasks: Vec<String>,

        /// Continue the last unfinished build session
        #[arg(long)]
        resume: bool,
    },
    /// Show the current build session
    BuildStatus,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_dir = conductor::init::is_initialized(&project_dir)
        .then(|| project_dir.join(conductor::config::CONDUCTOR_DIR).join("logs"));
    let _log_guard = conductor::logging::init(cli.verbose, log_dir.as_deref());

    match &cli.command {
        Commands::Init { existing } => cmd::cmd_init(&project_dir, *existing)?,
        Commands::Status => cmd::cmd_status(&project_dir)?,
        Commands::Start { agent } => cmd::cmd_start(&project_dir, agent)?,
        Commands::Complete {
            agent,
            score,
            critical,
        } => cmd::cmd_complete(&project_dir, agent, *score, *critical)?,
        Commands::Gate { agent, human } => cmd::cmd_gate(&project_dir, agent, *human)?,
        Commands::Approve { agent, score } => cmd::cmd_approve(&project_dir, agent, *score)?,
        Commands::Preview { decision } => cmd::cmd_preview(&project_dir, decision.as_deref())?,
        Commands::Reset { agent } => cmd::cmd_reset(&project_dir, agent)?,
        Commands::Spawn {
            agent,
            task,
            model,
            prompt,
            dry_run,
        } => {
            cmd::cmd_spawn(
                &project_dir,
                agent,
                task,
                model.as_deref(),
                prompt.as_deref(),
                *dry_run,
            )
            .await?
        }
        Commands::Build { tasks, resume } => cmd::cmd_build(&project_dir, tasks, *resume).await?,
        Commands::BuildStatus => cmd::cmd_build_status(&project_dir)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
