//! Configuration loading, validation, and management for Ember.
//!
//! Loads configuration from `~/.ember/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ember/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Orchestration loop budgets and thresholds
    #[serde(default)]
    pub governor: GovernorConfig,

    /// Memory store location and prompt injection limits
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Context window capacity and eviction policy
    #[serde(default)]
    pub context: ContextConfig,

    /// System prompt rendering
    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Maximum model calls per `execute`
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Directives honored per model response; extra ones are ignored
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls_per_iteration: u32,

    /// Confidence needed to finish with SUCCESS
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Wall-clock budget per `execute`, polled between iterations
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Heuristic confidence when the model gives no explicit tag
    #[serde(default = "default_confidence")]
    pub default_confidence: f32,

    /// Token budget per model response
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,
}

fn default_max_iterations() -> u32 {
    5
}
fn default_max_tool_calls() -> u32 {
    3
}
fn default_confidence_threshold() -> f32 {
    0.7
}
fn default_timeout_seconds() -> u64 {
    60
}
fn default_confidence() -> f32 {
    0.5
}
fn default_max_response_tokens() -> u32 {
    512
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_tool_calls_per_iteration: default_max_tool_calls(),
            confidence_threshold: default_confidence_threshold(),
            timeout_seconds: default_timeout_seconds(),
            default_confidence: default_confidence(),
            max_response_tokens: default_max_response_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding session logs and the `archive/` subdirectory
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Reuse a named session instead of generating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Corrections / patterns injected into the system prompt
    #[serde(default = "default_adaptive_limit")]
    pub adaptive_limit: usize,
}

fn default_storage_root() -> PathBuf {
    AppConfig::config_dir().join("memory")
}
fn default_adaptive_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            session_id: None,
            adaptive_limit: default_adaptive_limit(),
        }
    }
}

/// Eviction strategy names, as used by the `context_manage` tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionAction {
    SummarizeOld,
    #[default]
    ShiftWindow,
    PruneUnimportant,
}

impl EvictionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SummarizeOld => "summarize_old",
            Self::ShiftWindow => "shift_window",
            Self::PruneUnimportant => "prune_unimportant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Model state cache size in tokens
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f32,

    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f32,

    /// Most recent turns PRUNE_UNIMPORTANT never touches
    #[serde(default = "default_protected_tail")]
    pub protected_tail: usize,

    /// Default `keep_last_n_turns` for the `context_manage` tool
    #[serde(default = "default_keep_last_n")]
    pub default_keep_last_n: usize,

    /// Turns below this importance are pruned
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: f32,

    /// Action the governor runs on its own when health turns critical
    #[serde(default)]
    pub proactive_action: EvictionAction,

    #[serde(default = "default_true")]
    pub proactive_remediation: bool,
}

fn default_capacity() -> u32 {
    4096
}
fn default_warning_threshold() -> f32 {
    0.8
}
fn default_critical_threshold() -> f32 {
    0.95
}
fn default_protected_tail() -> usize {
    4
}
fn default_keep_last_n() -> usize {
    10
}
fn default_prune_threshold() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            warning_threshold: default_warning_threshold(),
            critical_threshold: default_critical_threshold(),
            protected_tail: default_protected_tail(),
            default_keep_last_n: default_keep_last_n(),
            prune_threshold: default_prune_threshold(),
            proactive_action: EvictionAction::default(),
            proactive_remediation: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Fail prompt rendering past this many characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prompt_chars: Option<usize>,
}

impl AppConfig {
    /// Load configuration from the default location with env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides()?;
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

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(root) = std::env::var("EMBER_STORAGE_ROOT") {
            self.memory.storage_root = PathBuf::from(root);
        }

        if let Ok(raw) = std::env::var("EMBER_MAX_ITERATIONS") {
            self.governor.max_iterations = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("EMBER_MAX_ITERATIONS is not a number: {raw}"))
            })?;
        }

        if let Ok(raw) = std::env::var("EMBER_CONFIDENCE_THRESHOLD") {
            self.governor.confidence_threshold = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "EMBER_CONFIDENCE_THRESHOLD is not a number: {raw}"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ember")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.governor;
        if g.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "governor.max_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&g.confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "governor.confidence_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&g.default_confidence) {
            return Err(ConfigError::ValidationError(
                "governor.default_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        let c = &self.context;
        if c.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "context.capacity must be > 0".into(),
            ));
        }
        if !(0.0 < c.warning_threshold && c.warning_threshold <= c.critical_threshold && c.critical_threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "context thresholds must satisfy 0 < warning <= critical <= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.prune_threshold) {
            return Err(ConfigError::ValidationError(
                "context.prune_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
