//! Quality gates: score an agent's evidence and emit a tiered verdict.
//!
//! A gate is a two-step template: [`QualityGate::collect_evidence`] gathers
//! whatever the gate looks at, [`QualityGate::validate_evidence`] scores it.
//! [`evaluate_gate`] runs both and resolves the verdict for the requested
//! [`GateMode`]. Gates have no side effects; persisting the verdict is the
//! caller's job.

pub mod artifact;

pub use artifact::{ArtifactCriterion, ArtifactGate};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::pipeline::{AgentId, PHASE_THRESHOLD, PipelineState};

/// Points below the threshold that still count as "needs revision".
pub const REVISION_MARGIN: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    NeedsRevision,
    Blocked,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Approved => write!(f, "approved"),
            Verdict::NeedsRevision => write!(f, "needs_revision"),
            Verdict::Blocked => write!(f, "blocked"),
        }
    }
}

/// Tiered verdict for a score.
///
/// A critical blocker always blocks. Otherwise `score >= threshold` approves,
/// the band `[threshold - 5, threshold)` needs revision, anything lower blocks.
pub fn determine_verdict(score: u8, threshold: u8, has_critical_blocker: bool) -> Verdict {
    if has_critical_blocker {
        Verdict::Blocked
    } else if score >= threshold {
        Verdict::Approved
    } else if score >= threshold.saturating_sub(REVISION_MARGIN) {
        Verdict::NeedsRevision
    } else {
        Verdict::Blocked
    }
}

/// Who resolves the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// The evaluator decides on its own.
    #[default]
    Autonomous,
    /// The evaluator only recommends; a person must approve.
    HumanInTheLoop,
}

impl std::fmt::Display for GateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateMode::Autonomous => write!(f, "autonomous"),
            GateMode::HumanInTheLoop => write!(f, "human-in-the-loop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Proceed,
    Revise,
    Escalate,
    AwaitApproval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateWarning {
    pub message: String,
    /// A critical warning forces a `Blocked` verdict.
    #[serde(default)]
    pub critical: bool,
}

impl GateWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            critical: false,
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            critical: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub description: String,
    pub passed: bool,
    pub weight: u32,
}

/// Output of [`QualityGate::validate_evidence`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub score: u8,
    pub criteria_results: Vec<CriterionResult>,
    pub all_criteria: u32,
    pub warnings: Vec<GateWarning>,
}

/// Read-only view a gate collects evidence from.
#[derive(Debug, Clone, Copy)]
pub struct ProjectContext<'a> {
    pub project_dir: &'a Path,
    pub pipeline: &'a PipelineState,
    pub agent: AgentId,
}

/// A gate implementation supplies the evidence collection and scoring steps.
pub trait QualityGate {
    type Evidence: Serialize;

    fn name(&self) -> &str;

    fn threshold(&self) -> u8 {
        PHASE_THRESHOLD
    }

    fn collect_evidence(&self, ctx: &ProjectContext<'_>) -> Result<Self::Evidence>;

    fn validate_evidence(&self, evidence: &Self::Evidence) -> Validation;
}

/// Result of evaluating one agent's work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: String,
    pub agent: AgentId,
    pub mode: GateMode,
    pub verdict: Verdict,
    pub score: u8,
    pub threshold: u8,
    pub evidence: serde_json::Value,
    pub criteria_count: u32,
    pub warnings: Vec<GateWarning>,
    pub recommendation: String,
    pub recommended_action: RecommendedAction,
    /// True only for an autonomous `Approved` verdict.
    pub can_proceed: bool,
}

impl GateResult {
    pub fn has_critical_warning(&self) -> bool {
        self.warnings.iter().any(|w| w.critical)
    }
}

/// Run a gate end to end.
pub fn evaluate_gate<G: QualityGate + ?Sized>(
    gate: &G,
    ctx: &ProjectContext<'_>,
    mode: GateMode,
) -> Result<GateResult> {
    let evidence = gate
        .collect_evidence(ctx)
        .with_context(|| format!("Gate '{}' failed to collect evidence", gate.name()))?;
    let validation = gate.validate_evidence(&evidence);
    let evidence = serde_json::to_value(&evidence)
        .with_context(|| format!("Gate '{}' produced unserializable evidence", gate.name()))?;

    let threshold = gate.threshold();
    let has_critical = validation.warnings.iter().any(|w| w.critical);
    let verdict = determine_verdict(validation.score, threshold, has_critical);

    let (can_proceed, recommended_action, recommendation) = match mode {
        GateMode::Autonomous => {
            let action = match verdict {
                Verdict::Approved => RecommendedAction::Proceed,
                Verdict::NeedsRevision => RecommendedAction::Revise,
                Verdict::Blocked => RecommendedAction::Escalate,
            };
            let text = match verdict {
                Verdict::Approved => format!(
                    "Score {} meets threshold {}; proceed",
                    validation.score, threshold
                ),
                Verdict::NeedsRevision => format!(
                    "Score {} is within {} points of threshold {}; revise and re-run {}",
                    validation.score, REVISION_MARGIN, threshold, ctx.agent
                ),
                Verdict::Blocked if has_critical => {
                    "Critical blocker present; escalate before continuing".to_string()
                }
                Verdict::Blocked => format!(
                    "Score {} is well below threshold {}; escalate",
                    validation.score, threshold
                ),
            };
            (verdict == Verdict::Approved, action, text)
        }
        GateMode::HumanInTheLoop => (
            false,
            RecommendedAction::AwaitApproval,
            format!(
                "Gate '{}' scored {}/{} ({}); awaiting human approval",
                gate.name(),
                validation.score,
                threshold,
                verdict
            ),
        ),
    };

    tracing::info!(
        gate = gate.name(),
        agent = %ctx.agent,
        score = validation.score,
        %verdict,
        %mode,
        "gate evaluated"
    );

    Ok(GateResult {
        gate: gate.name().to_string(),
        agent: ctx.agent,
        mode,
        verdict,
        score: validation.score,
        threshold,
        evidence,
        criteria_count: validation.all_criteria,
        warnings: validation.warnings,
        recommendation,
        recommended_action,
        can_proceed,
    })
}
