//! Gate that scores an agent by the project artifacts it was expected to leave.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{CriterionResult, GateWarning, ProjectContext, QualityGate, Validation};
use crate::pipeline::PHASE_THRESHOLD;

fn default_weight() -> u32 {
    1
}

fn default_min_bytes() -> u64 {
    1
}

/// One expected artifact, relative to the project directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCriterion {
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// A missing critical artifact blocks the gate outright.
    #[serde(default)]
    pub critical: bool,
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,
}

impl ArtifactCriterion {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            description: None,
            weight: default_weight(),
            critical: false,
            min_bytes: default_min_bytes(),
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    fn label(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("{} exists", self.path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEvidence {
    pub criterion: ArtifactCriterion,
    pub exists: bool,
    pub bytes: u64,
}

impl ArtifactEvidence {
    fn satisfied(&self) -> bool {
        self.exists && self.bytes >= self.criterion.min_bytes
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactGate {
    name: String,
    threshold: u8,
    criteria: Vec<ArtifactCriterion>,
}

impl ArtifactGate {
    pub fn new(name: &str, criteria: Vec<ArtifactCriterion>) -> Self {
        Self {
            name: name.to_string(),
            threshold: PHASE_THRESHOLD,
            criteria,
        }
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn criteria(&self) -> &[ArtifactCriterion] {
        &self.criteria
    }
}

impl QualityGate for ArtifactGate {
    type Evidence = Vec<ArtifactEvidence>;

    fn name(&self) -> &str {
        &self.name
    }

    fn threshold(&self) -> u8 {
        self.threshold
    }

    fn collect_evidence(&self, ctx: &ProjectContext<'_>) -> Result<Self::Evidence> {
        Ok(self
            .criteria
            .iter()
            .map(|criterion| {
                let path = ctx.project_dir.join(&criterion.path);
                let meta = std::fs::metadata(&path).ok();
                let bytes = match &meta {
                    Some(m) if m.is_dir() => std::fs::read_dir(&path)
                        .map(|entries| entries.count() as u64)
                        .unwrap_or(0),
                    Some(m) => m.len(),
                    None => 0,
                };
                ArtifactEvidence {
                    criterion: criterion.clone(),
                    exists: meta.is_some(),
                    bytes,
                }
            })
            .collect())
    }

    fn validate_evidence(&self, evidence: &Self::Evidence) -> Validation {
        let total: u64 = evidence.iter().map(|e| u64::from(e.criterion.weight)).sum();
        let passed: u64 = evidence
            .iter()
            .filter(|e| e.satisfied())
            .map(|e| u64::from(e.criterion.weight))
            .sum();

        let mut warnings = Vec::new();
        if evidence.is_empty() {
            warnings.push(GateWarning::new("No criteria configured; gate cannot pass"));
        }
        for e in evidence.iter().filter(|e| !e.satisfied()) {
            let message = if e.exists {
                format!("{} is smaller than {} bytes", e.criterion.path, e.criterion.min_bytes)
            } else {
                format!("{} is missing", e.criterion.path)
            };
            warnings.push(if e.criterion.critical {
                GateWarning::critical(message)
            } else {
                GateWarning::new(message)
            });
        }

        let score = if total == 0 {
            0
        } else {
            ((passed as f64 / total as f64) * 100.0).round() as u8
        };

        Validation {
            score,
            criteria_results: evidence
                .iter()
                .map(|e| CriterionResult {
                    description: e.criterion.label(),
                    passed: e.satisfied(),
                    weight: e.criterion.weight,
                })
                .collect(),
            all_criteria: evidence.len() as u32,
            warnings,
        }
    }
}
