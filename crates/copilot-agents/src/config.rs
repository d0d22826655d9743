//! Agent configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `COPILOT_*` environment variables. Every section is optional in the file.
//!
//! ```toml
//! [provider]
//! base_url = "https://api.deepseek.com"
//! model = "deepseek-chat"
//!
//! [engine]
//! max_iterations = 8
//! tool_timeout_secs = 10
//!
//! [routing]
//! similarity_threshold = 0.8
//! tier_defaults = { complex = "react" }
//! escalation = [{ from = "react", to = "full_cot" }]
//!
//! [planning]
//! min_tier = "complex"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use routing::escalation::{EscalationLadder, LadderStep};
use routing::memory::ArchitectureSelector;
use routing::router::{ComplexityTier, Strategy};
use routing::stream::{ParserConfig, DEFAULT_TOOL_RESULT_CAP};
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

pub const ENV_BASE_URL: &str = "COPILOT_BASE_URL";
pub const ENV_API_KEY: &str = "COPILOT_API_KEY";
pub const ENV_MODEL: &str = "COPILOT_MODEL";

/// Completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_secs: u64,
    /// Sampling temperature for the main loop; helper calls pick their own.
    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".into(),
            api_key: None,
            model: "deepseek-chat".into(),
            request_timeout_secs: 120,
            temperature: None,
        }
    }
}

/// Execution loop budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_iterations: u32,
    pub tool_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            tool_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub similarity_threshold: f64,
    pub cache_capacity: usize,
    /// Steps applied on top of the built-in escalation ladder
    pub escalation: Vec<LadderStep>,
    /// Per-tier replacements for the default strategy mapping
    pub tier_defaults: HashMap<ComplexityTier, Strategy>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: routing::router::classifier::DEFAULT_SIMILARITY_THRESHOLD,
            cache_capacity: routing::router::classifier::DEFAULT_CACHE_CAPACITY,
            escalation: Vec::new(),
            tier_defaults: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub enabled: bool,
    /// Lowest tier that gets a plan
    pub min_tier: ComplexityTier,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_tier: ComplexityTier::Complex,
        }
    }
}

impl PlanningConfig {
    pub fn applies_to(&self, tier: ComplexityTier) -> bool {
        self.enabled && tier >= self.min_tier
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    pub tool_result_cap: usize,
    pub thinking_heuristics: bool,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            tool_result_cap: DEFAULT_TOOL_RESULT_CAP,
            thinking_heuristics: true,
        }
    }
}

impl From<&ParserSettings> for ParserConfig {
    fn from(settings: &ParserSettings) -> Self {
        ParserConfig {
            tool_result_cap: settings.tool_result_cap,
            thinking_heuristics: settings.thinking_heuristics,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorAnalysisConfig {
    pub enabled: bool,
}

impl Default for ErrorAnalysisConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub provider: ProviderConfig,
    pub engine: EngineConfig,
    pub routing: RoutingConfig,
    pub planning: PlanningConfig,
    pub parser: ParserSettings,
    pub error_analysis: ErrorAnalysisConfig,
}

impl AgentConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse agent config TOML")
    }

    /// Load a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Defaults or `path`, then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `COPILOT_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.provider.base_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.is_empty()) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.provider.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.provider.base_url.trim().is_empty() {
            return Err(PipelineError::Configuration("provider.base_url is empty".into()));
        }
        if self.provider.model.trim().is_empty() {
            return Err(PipelineError::Configuration("provider.model is empty".into()));
        }
        if self.engine.max_iterations == 0 {
            return Err(PipelineError::Configuration(
                "engine.max_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.routing.similarity_threshold) {
            return Err(PipelineError::Configuration(format!(
                "routing.similarity_threshold {} is outside 0..=1",
                self.routing.similarity_threshold
            )));
        }
        if self.routing.cache_capacity == 0 {
            return Err(PipelineError::Configuration(
                "routing.cache_capacity must be at least 1".into(),
            ));
        }
        self.ladder()?;
        Ok(())
    }

    pub fn ladder(&self) -> Result<EscalationLadder, PipelineError> {
        EscalationLadder::with_steps(&self.routing.escalation)
            .map_err(|e| PipelineError::Configuration(e.to_string()))
    }

    pub fn selector(&self) -> ArchitectureSelector {
        ArchitectureSelector::new().with_tier_defaults(self.routing.tier_defaults.clone())
    }
}
