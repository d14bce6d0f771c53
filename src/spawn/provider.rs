//! Backend providers: one implementation per executor CLI.
//!
//! A provider only translates the abstract request (model tier, prompt on
//! stdin) into its native invocation; the spawner owns everything else.

use std::fmt::Debug;

use crate::errors::SpawnError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Balanced,
    Powerful,
}

impl ModelTier {
    /// Parse a tier name; `None` means the string is a literal model id.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "haiku" => Some(ModelTier::Fast),
            "balanced" | "sonnet" => Some(ModelTier::Balanced),
            "powerful" | "opus" => Some(ModelTier::Powerful),
            _ => None,
        }
    }
}

pub trait Provider: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn program(&self) -> &str;

    /// Arguments that precede the model flag. Never contains the prompt.
    fn base_args(&self) -> Vec<String>;

    fn model_flag(&self) -> &str {
        "--model"
    }

    fn model_for_tier(&self, tier: ModelTier) -> &str;

    fn resolve_model(&self, requested: &str) -> String {
        match ModelTier::parse(requested) {
            Some(tier) => self.model_for_tier(tier).to_string(),
            None => requested.trim().to_string(),
        }
    }

    fn build_args(&self, model: Option<&str>) -> Vec<String> {
        let mut args = self.base_args();
        if let Some(requested) = model.filter(|m| !m.trim().is_empty()) {
            args.push(self.model_flag().to_string());
            args.push(self.resolve_model(requested));
        }
        args
    }
}

#[derive(Debug, Clone)]
pub struct ClaudeProvider {
    program: String,
    skip_permissions: bool,
}

impl ClaudeProvider {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            skip_permissions: true,
        }
    }

    pub fn with_skip_permissions(mut self, skip: bool) -> Self {
        self.skip_permissions = skip;
        self
    }
}

impl Default for ClaudeProvider {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl Provider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn base_args(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.skip_permissions {
            flags.push("--dangerously-skip-permissions".to_string());
        }
        flags.push("--print".to_string());
        flags.push("--output-format".to_string());
        flags.push("stream-json".to_string());
        flags.push("--verbose".to_string());
        flags
    }

    fn model_for_tier(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => "claude-haiku-4-5",
            ModelTier::Balanced => "claude-sonnet-4-5",
            ModelTier::Powerful => "claude-opus-4-1",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodexProvider {
    program: String,
}

impl CodexProvider {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CodexProvider {
    fn default() -> Self {
        Self::new("codex")
    }
}

impl Provider for CodexProvider {
    fn name(&self) -> &str {
        "codex"
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn base_args(&self) -> Vec<String> {
        // `-` reads the prompt from stdin.
        vec![
            "exec".to_string(),
            "--json".to_string(),
            "--full-auto".to_string(),
            "-".to_string(),
        ]
    }

    fn model_for_tier(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => "gpt-5-codex-mini",
            ModelTier::Balanced => "gpt-5-codex",
            ModelTier::Powerful => "gpt-5",
        }
    }
}

/// Select a provider by configured name, optionally overriding its program.
pub fn provider_for_name(
    name: &str,
    program: Option<&str>,
    skip_permissions: bool,
) -> Result<Box<dyn Provider>, SpawnError> {
    match name.trim().to_lowercase().as_str() {
        "claude" => Ok(Box::new(
            ClaudeProvider::new(program.unwrap_or("claude")).with_skip_permissions(skip_permissions),
        )),
        "codex" => Ok(Box::new(CodexProvider::new(program.unwrap_or("codex")))),
        _ => Err(SpawnError::UnknownProvider(name.to_string())),
    }
}
