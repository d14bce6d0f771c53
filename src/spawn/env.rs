//! Environment sanitization for spawned executors.
//!
//! A child must not inherit variables that identify the runtime hosting the
//! orchestrator, or it may believe it is nested inside that runtime. The
//! tables below are the whole policy: the preserve list wins over the deny
//! list so credentials always pass through.

use std::collections::BTreeMap;

const DENY_EXACT: &[&str] = &[
    "CLAUDECODE",
    "CLAUDE_CODE_ENTRYPOINT",
    "CLAUDE_CODE_SSE_PORT",
    "CODEX_SANDBOX",
    "CODEX_SANDBOX_NETWORK_DISABLED",
    "CODEX_MANAGED_BY_NPM",
];

const DENY_PREFIXES: &[&str] = &["CLAUDE_CODE_", "CODEX_", "CONDUCTOR_"];

const PRESERVE_EXACT: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_AUTH_TOKEN",
    "OPENAI_API_KEY",
    "CLAUDE_CODE_OAUTH_TOKEN",
    "CODEX_API_KEY",
];

const PRESERVE_SUFFIXES: &[&str] = &["_API_KEY", "_TOKEN", "_SECRET", "_SECRET_KEY"];

pub fn is_credential_var(name: &str) -> bool {
    PRESERVE_EXACT.contains(&name) || PRESERVE_SUFFIXES.iter().any(|s| name.ends_with(s))
}

pub fn is_host_identity_var(name: &str) -> bool {
    DENY_EXACT.contains(&name) || DENY_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Copy of `env` without host-identity variables. Credentials are kept.
pub fn clean_parent_env(env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .filter(|(name, _)| is_credential_var(name) || !is_host_identity_var(name))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Snapshot of this process's environment.
pub fn current_env() -> BTreeMap<String, String> {
    std::env::vars().collect()
}
