//! Write-scope isolation for concurrently spawned agents.
//!
//! A scope is a set of project-relative path prefixes. Two scopes intersect
//! when any region of one equals, contains, or lies inside a region of the
//! other. Isolation is checked once, before any process of a batch starts.

use serde::{Deserialize, Serialize};

use super::SpawnConfig;
use crate::pipeline::AgentId;

/// Rendering of an unrestricted read scope in the child environment.
pub const UNRESTRICTED: &str = "*";

const ROOT: &str = ".";

/// Regions are normalized on every construction path, deserialization included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct WriteScope(Vec<String>);

impl WriteScope {
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut regions: Vec<String> = regions
            .into_iter()
            .map(|r| normalize(r.as_ref()))
            .collect();
        regions.sort();
        regions.dedup();
        Self(regions)
    }

    pub fn regions(&self) -> &[String] {
        &self.0
    }

    /// First pair of overlapping regions, if any.
    pub fn intersection(&self, other: &WriteScope) -> Option<String> {
        for a in &self.0 {
            for b in &other.0 {
                if regions_overlap(a, b) {
                    return Some(if a.len() >= b.len() { a.clone() } else { b.clone() });
                }
            }
        }
        None
    }

    pub fn intersects(&self, other: &WriteScope) -> bool {
        self.intersection(other).is_some()
    }

    /// Comma-separated form passed to the child as `CONDUCTOR_WRITE_SCOPE`.
    pub fn descriptor(&self) -> String {
        self.0.join(",")
    }
}

impl From<Vec<String>> for WriteScope {
    fn from(regions: Vec<String>) -> Self {
        Self::new(regions)
    }
}

impl From<WriteScope> for Vec<String> {
    fn from(scope: WriteScope) -> Self {
        scope.0
    }
}

impl std::fmt::Display for WriteScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.descriptor())
    }
}

fn normalize(region: &str) -> String {
    let trimmed = region
        .trim()
        .trim_start_matches("./")
        .trim_end_matches('/');
    if trimmed.is_empty() || trimmed == ROOT {
        ROOT.to_string()
    } else {
        trimmed.to_string()
    }
}

fn regions_overlap(a: &str, b: &str) -> bool {
    a == ROOT
        || b == ROOT
        || a == b
        || b.strip_prefix(a).is_some_and(|rest| rest.starts_with('/'))
        || a.strip_prefix(b).is_some_and(|rest| rest.starts_with('/'))
}

/// Default region each agent may write.
pub fn scope_for_agent(agent: AgentId) -> WriteScope {
    let regions: &[&str] = match agent {
        AgentId::Discovery | AgentId::CodebaseAnalyst => &["docs/discovery"],
        AgentId::Researcher => &["docs/research"],
        AgentId::Requirements => &["docs/requirements"],
        AgentId::Architect => &["docs/architecture"],
        AgentId::UxDesigner => &["docs/ux"],
        AgentId::ApiDesigner => &["docs/api"],
        AgentId::PlanReviewer => &["docs/plan-review"],
        AgentId::Scaffolder => &[ROOT],
        // Verification edits the same tree it verifies.
        AgentId::Implementer | AgentId::Qa => &["src", "tests"],
        AgentId::Deployer => &["deploy", ".github/workflows"],
        AgentId::Monitor => &["ops/monitoring"],
    };
    WriteScope::new(regions)
}

/// Scope a config will run with: its explicit scope, else its agent's default.
pub fn resolve_scope(config: &SpawnConfig) -> Option<WriteScope> {
    if let Some(scope) = &config.write_scope {
        return Some(scope.clone());
    }
    config
        .agent
        .as_deref()
        .and_then(|a| a.parse::<AgentId>().ok())
        .map(scope_for_agent)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConflict {
    pub first: String,
    pub second: String,
    pub region: String,
}

impl std::fmt::Display for ScopeConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {} on {}", self.first, self.second, self.region)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ScopeConflict>,
}

/// Check that every pair of configs in a batch writes disjoint regions.
///
/// Configs without a resolvable scope are left to the command builder to
/// reject.
pub fn validate_write_scopes(configs: &[SpawnConfig]) -> ScopeValidation {
    let resolved: Vec<(String, WriteScope)> = configs
        .iter()
        .filter_map(|c| resolve_scope(c).map(|s| (label(c), s)))
        .collect();

    let mut conflicts = Vec::new();
    for (i, (first, a)) in resolved.iter().enumerate() {
        for (second, b) in &resolved[i + 1..] {
            if let Some(region) = a.intersection(b) {
                conflicts.push(ScopeConflict {
                    first: first.clone(),
                    second: second.clone(),
                    region,
                });
            }
        }
    }

    ScopeValidation {
        valid: conflicts.is_empty(),
        conflicts,
    }
}

fn label(config: &SpawnConfig) -> String {
    format!(
        "{}/{}",
        config.agent.as_deref().unwrap_or("?"),
        config.task_id.as_deref().unwrap_or("?")
    )
}
