//! Binds the pipeline state machine to a store, gates, the spawner and the
//! build loop. Every mutating call loads the current record, applies one
//! transition and saves the result.

pub mod runner;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::build::{
    BuildEvent, BuildRequest, BuildSummary, abandon_build, run_build_loop,
};
use crate::config::ConductorConfig;
use crate::gates::{
    ArtifactGate, GateMode, GateResult, ProjectContext, QualityGate, evaluate_gate,
};
use crate::pipeline::{
    AdvanceOutcome, AgentId, AgentResult, AgentStatus, HistoryAction, HistoryEntry, Phase,
    PhaseTransitionCheck, PipelineProgress, PipelineState, PreviewDecision, TransitionTrigger,
    advance_pipeline_with_threshold, check_phase_transition_with_threshold, confirm_preview,
    get_pipeline_progress, init_pipeline, mark_agent_in_progress, reset_pipeline_to,
};
use crate::spawn::{SpawnConfig, Spawner, TerminalHandle};
use crate::store::{BuildStore, FileStore, PipelineStore};

pub use runner::AgentTaskExecutor;

/// Outcome of running a gate through the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateAdvance {
    pub gate: GateResult,
    /// `None` while a human-in-the-loop gate awaits approval.
    pub outcome: Option<AdvanceOutcome>,
}

pub struct Orchestrator<S> {
    config: ConductorConfig,
    store: S,
    spawner: Spawner,
}

impl Orchestrator<FileStore> {
    /// Orchestrator over `.conductor/` with a spawner from `[spawn]`.
    pub fn open(config: ConductorConfig) -> Result<Self> {
        let store = FileStore::new(config.conductor_dir.clone());
        let spawner = Spawner::from_config(&config.toml, &config.project_dir)
            .context("Failed to configure spawner")?
            .with_log_dir(config.log_dir());
        Ok(Self::new(config, store, spawner))
    }
}

impl<S: PipelineStore + BuildStore> Orchestrator<S> {
    pub fn new(config: ConductorConfig, store: S, spawner: Spawner) -> Self {
        Self {
            config,
            store,
            spawner,
        }
    }

    pub fn config(&self) -> &ConductorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    /// Load the pipeline, creating it from `[project] kind` when absent.
    pub fn load_or_init(&self) -> Result<PipelineState> {
        if let Some(state) = self.store.load_pipeline()? {
            return Ok(state);
        }
        let state = init_pipeline(self.config.toml.project.kind);
        self.store.save_pipeline(&state)?;
        Ok(state)
    }

    /// Load the pipeline or fail when the project has none yet.
    pub fn state(&self) -> Result<PipelineState> {
        self.store
            .load_pipeline()?
            .context("No pipeline found. Run `conductor init` first.")
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut PipelineState) -> Result<T>) -> Result<T> {
        let mut state = self.state()?;
        let value = f(&mut state)?;
        self.store.save_pipeline(&state)?;
        Ok(value)
    }

    pub fn start_agent(&self, agent: AgentId) -> Result<PipelineState> {
        self.mutate(|state| {
            mark_agent_in_progress(state, agent)?;
            Ok(state.clone())
        })
    }

    /// Gate threshold from `[gates] threshold`.
    fn threshold(&self) -> u8 {
        self.config.toml.gates.threshold
    }

    pub fn complete_agent(&self, agent: AgentId, result: AgentResult) -> Result<AdvanceOutcome> {
        let threshold = self.threshold();
        self.mutate(|state| Ok(advance_pipeline_with_threshold(state, agent, &result, threshold)?))
    }

    /// Configured artifact gate for `agent`.
    pub fn gate_for(&self, agent: AgentId) -> Result<ArtifactGate> {
        match self.config.toml.artifact_gate(agent) {
            Some(gate) => Ok(gate),
            None => bail!(
                "No gate criteria configured for '{agent}'. Add [gates.criteria.{agent}] to conductor.toml"
            ),
        }
    }

    /// Evaluate `gate` for `agent` and apply the result.
    ///
    /// Autonomous mode advances the pipeline with the gate score.
    /// Human-in-the-loop mode only records the result; [`Self::approve_gate`]
    /// advances later.
    pub fn evaluate_and_advance<G: QualityGate + ?Sized>(
        &self,
        agent: AgentId,
        gate: &G,
        mode: GateMode,
    ) -> Result<GateAdvance> {
        self.mutate(|state| {
            state.ensure_in_roster(agent)?;
            let ctx = ProjectContext {
                project_dir: &self.config.project_dir,
                pipeline: state,
                agent,
            };
            let result = evaluate_gate(gate, &ctx, mode)?;

            let outcome = match mode {
                GateMode::Autonomous => {
                    let agent_result = AgentResult {
                        score: result.score,
                        criteria_count: Some(result.criteria_count),
                        critical_blocker: result.has_critical_warning(),
                    };
                    // The transition uses the threshold the gate was judged by.
                    Some(advance_pipeline_with_threshold(
                        state,
                        agent,
                        &agent_result,
                        result.threshold,
                    )?)
                }
                GateMode::HumanInTheLoop => {
                    state.current_agent = Some(agent);
                    state.history.push(
                        HistoryEntry::new(agent, HistoryAction::GateWaiting)
                            .with_score(result.score)
                            .with_detail(format!("awaiting approval ({})", result.verdict)),
                    );
                    None
                }
            };
            Ok(GateAdvance {
                gate: result,
                outcome,
            })
        })
    }

    /// Human approval of a gate: advance with the given score.
    pub fn approve_gate(&self, agent: AgentId, score: u8) -> Result<AdvanceOutcome> {
        let threshold = self.threshold();
        self.mutate(|state| {
            let before = state.mode_transitions.len();
            let outcome = advance_pipeline_with_threshold(
                state,
                agent,
                &AgentResult::scored(score),
                threshold,
            )?;
            if state.mode_transitions.len() > before
                && let Some(transition) = state.mode_transitions.last_mut()
            {
                transition.trigger = TransitionTrigger::User;
            }
            Ok(outcome)
        })
    }

    pub fn confirm_preview(&self, decision: PreviewDecision) -> Result<AdvanceOutcome> {
        self.mutate(|state| Ok(confirm_preview(state, decision)?))
    }

    /// Rewind to `agent`. A rewind into or before the build phase abandons
    /// any unfinished build session.
    pub fn reset_to(&self, agent: AgentId) -> Result<PipelineState> {
        let state = self.mutate(|state| {
            reset_pipeline_to(state, agent)?;
            Ok(state.clone())
        })?;
        if agent.phase() <= Phase::Build {
            abandon_build(&self.store)?;
        }
        Ok(state)
    }

    pub fn progress(&self) -> Result<PipelineProgress> {
        Ok(get_pipeline_progress(&self.state()?))
    }

    pub fn check_transition(&self) -> Result<PhaseTransitionCheck> {
        Ok(check_phase_transition_with_threshold(
            &self.state()?,
            self.threshold(),
        ))
    }

    /// Spawn a batch and mark each spawned roster agent in progress.
    pub async fn spawn_batch(&self, configs: &[SpawnConfig]) -> Result<Vec<TerminalHandle>> {
        let mut state = self.state()?;
        let handles = self.spawner.spawn_batch(configs).await?;
        for handle in &handles {
            if state.ensure_in_roster(handle.agent).is_ok()
                && state.status_of(handle.agent) != Some(AgentStatus::InProgress)
            {
                mark_agent_in_progress(&mut state, handle.agent)?;
            }
        }
        self.store.save_pipeline(&state)?;
        Ok(handles)
    }

    /// Run build tasks through implementer executors.
    pub async fn run_build<F>(&self, request: &BuildRequest, on_progress: F) -> Result<BuildSummary>
    where
        F: FnMut(&BuildEvent),
    {
        let executor = AgentTaskExecutor::new(&self.spawner, AgentId::Implementer);
        let summary = run_build_loop(
            &self.store,
            request,
            &self.config.toml.build_loop_config(),
            &executor,
            on_progress,
        )
        .await?;
        Ok(summary)
    }
}
