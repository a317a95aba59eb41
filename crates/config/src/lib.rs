//! Configuration loading, validation, and management for stratagem.
//!
//! Loads configuration from `~/.stratagem/config.toml` with environment
//! variable overrides. Validates all settings at startup. Every strategy
//! knob lives here so engines are built once from plain values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stratagem/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key handed to the completion backend as an opaque credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible completion endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used by every strategy
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Search-capable model used by the web search tool
    #[serde(default = "default_search_model")]
    pub search_model: String,

    /// Retry / backoff policy of the LLM client
    #[serde(default)]
    pub retry: RetryConfig,

    /// Knowledge index settings
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Chain-of-Thought / Self-Consistency
    #[serde(default)]
    pub cot: CotConfig,

    /// ReAct
    #[serde(default)]
    pub react: ReactConfig,

    /// ReWOO
    #[serde(default)]
    pub rewoo: RewooConfig,

    /// Plan-Execute
    #[serde(default)]
    pub plan_execute: PlanExecuteConfig,
}

fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_search_model() -> String {
    "perplexity/sonar".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("search_model", &self.search_model)
            .field("retry", &self.retry)
            .field("knowledge", &self.knowledge)
            .field("cot", &self.cot)
            .field("react", &self.react)
            .field("rewoo", &self.rewoo)
            .field("plan_execute", &self.plan_execute)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every further retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// MediaWiki API endpoint
    #[serde(default = "default_knowledge_endpoint")]
    pub endpoint: String,

    /// REST endpoint serving page summaries
    #[serde(default = "default_summary_endpoint")]
    pub summary_endpoint: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Summary of the top hit is cut to this many characters
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
}

fn default_knowledge_endpoint() -> String {
    "https://en.wikipedia.org/w/api.php".into()
}
fn default_summary_endpoint() -> String {
    "https://en.wikipedia.org/api/rest_v1/page/summary".into()
}
fn default_max_results() -> usize {
    3
}
fn default_summary_chars() -> usize {
    800
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_knowledge_endpoint(),
            summary_endpoint: default_summary_endpoint(),
            max_results: default_max_results(),
            summary_chars: default_summary_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CotConfig {
    /// Number of independent reasoning paths
    #[serde(default = "default_samples")]
    pub samples: usize,

    #[serde(default = "default_sampling_temperature")]
    pub temperature: f32,

    /// Few-shot exemplars (true) or zero-shot "think step by step" (false)
    #[serde(default = "default_true")]
    pub few_shot: bool,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_samples() -> usize {
    5
}
fn default_sampling_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_agent_temperature() -> f32 {
    0.0
}

impl Default for CotConfig {
    fn default() -> Self {
        Self {
            samples: default_samples(),
            temperature: default_sampling_temperature(),
            few_shot: true,
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    #[serde(default = "default_agent_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_turns() -> u32 {
    50
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            temperature: default_agent_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewooConfig {
    #[serde(default = "default_agent_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for RewooConfig {
    fn default() -> Self {
        Self {
            temperature: default_agent_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecuteConfig {
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,

    /// Turn budget of each step's executor loop
    #[serde(default = "default_max_step_turns")]
    pub max_step_turns: u32,

    #[serde(default = "default_agent_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_replans() -> u32 {
    20
}
fn default_max_step_turns() -> u32 {
    8
}

impl Default for PlanExecuteConfig {
    fn default() -> Self {
        Self {
            max_replans: default_max_replans(),
            max_step_turns: default_max_step_turns(),
            temperature: default_agent_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stratagem/config.toml).
    ///
    /// Also checks environment variables for the API key:
    /// - `STRATAGEM_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = ["STRATAGEM_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"]
                .iter()
                .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()));
        }

        if let Some(model) = lookup("STRATAGEM_MODEL") {
            self.default_model = model;
        }

        if let Some(url) = lookup("STRATAGEM_API_URL") {
            self.api_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stratagem")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let temperatures = [
            ("cot.temperature", self.cot.temperature),
            ("react.temperature", self.react.temperature),
            ("rewoo.temperature", self.rewoo.temperature),
            ("plan_execute.temperature", self.plan_execute.temperature),
        ];
        for (name, t) in temperatures {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.cot.samples == 0 {
            return Err(ConfigError::ValidationError(
                "cot.samples must be at least 1".into(),
            ));
        }

        if self.react.max_turns == 0 || self.plan_execute.max_step_turns == 0 {
            return Err(ConfigError::ValidationError(
                "turn budgets must be at least 1".into(),
            ));
        }

        if self.plan_execute.max_replans == 0 {
            return Err(ConfigError::ValidationError(
                "plan_execute.max_replans must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            search_model: default_search_model(),
            retry: RetryConfig::default(),
            knowledge: KnowledgeConfig::default(),
            cot: CotConfig::default(),
            react: ReactConfig::default(),
            rewoo: RewooConfig::default(),
            plan_execute: PlanExecuteConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
