//! Configuration loading, validation, and management for contextweave.
//!
//! Loads configuration from `~/.contextweave/config.toml` with environment
//! variable overrides. Validates all settings at load time.

pub mod logging;

use contextweave_core::memory::RetrievalMode;
use contextweave_core::model::{DEFAULT_RESERVED_FOR_COMPLETION, ModelKind};
use contextweave_core::policy::MessagePolicy;
use contextweave_core::prompt::PromptConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use logging::{LoggingConfig, init_tracing};

/// The root configuration structure.
///
/// Maps directly to `~/.contextweave/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model used when the caller does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Completion space kept free on every built-in model
    #[serde(default = "default_reserved_for_completion")]
    pub reserved_for_completion: usize,

    /// How history is picked
    #[serde(default)]
    pub retrieval: RetrievalMode,

    /// History/context budget split
    #[serde(default)]
    pub message_policy: MessagePolicy,

    /// Per-request settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Memory store configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Token counting configuration
    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    /// Extra or overridden model catalog entries
    #[serde(default)]
    pub models: HashMap<String, ModelOverride>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_model() -> String {
    "gpt-3.5-turbo-16k".into()
}
fn default_reserved_for_completion() -> usize {
    DEFAULT_RESERVED_FOR_COMPLETION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "in_memory" or "sqlite"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Database location for the sqlite backend
    #[serde(default = "default_memory_path")]
    pub path: String,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_memory_path() -> String {
    format!(
        "sqlite://{}",
        EngineConfig::config_dir().join("memory.db").display()
    )
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: default_memory_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// "approx" or "hf"
    #[serde(default = "default_tokenizer_kind")]
    pub kind: String,

    /// Ratio used by the approx tokenizer
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// `tokenizer.json` used by the hf tokenizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_tokenizer_kind() -> String {
    "approx".into()
}
fn default_chars_per_token() -> usize {
    4
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            kind: default_tokenizer_kind(),
            chars_per_token: default_chars_per_token(),
            path: None,
        }
    }
}

/// A catalog entry declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOverride {
    pub max_context_length: usize,

    /// Falls back to the top-level `reserved_for_completion`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_for_completion: Option<usize>,

    #[serde(default = "default_model_kind")]
    pub kind: ModelKind,
}

fn default_model_kind() -> ModelKind {
    ModelKind::PlainChat
}

impl EngineConfig {
    /// Load configuration from the default path (~/.contextweave/config.toml),
    /// then apply environment overrides:
    /// - `CONTEXTWEAVE_MODEL`
    /// - `CONTEXTWEAVE_MEMORY_BACKEND`
    /// - `CONTEXTWEAVE_MEMORY_PATH`
    /// - `CONTEXTWEAVE_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
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

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("CONTEXTWEAVE_MODEL") {
            self.default_model = model;
        }
        if let Some(backend) = lookup("CONTEXTWEAVE_MEMORY_BACKEND") {
            self.memory.backend = backend;
        }
        if let Some(path) = lookup("CONTEXTWEAVE_MEMORY_PATH") {
            self.memory.path = path;
        }
        if let Some(level) = lookup("CONTEXTWEAVE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".contextweave")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.memory.backend.as_str(), "in_memory" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be \"in_memory\" or \"sqlite\" (got \"{}\")",
                self.memory.backend
            )));
        }

        match self.tokenizer.kind.as_str() {
            "approx" => {
                if self.tokenizer.chars_per_token == 0 {
                    return Err(ConfigError::ValidationError(
                        "tokenizer.chars_per_token must be > 0".into(),
                    ));
                }
            }
            "hf" => {
                if self.tokenizer.path.is_none() {
                    return Err(ConfigError::ValidationError(
                        "tokenizer.path is required when tokenizer.kind = \"hf\"".into(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "tokenizer.kind must be \"approx\" or \"hf\" (got \"{other}\")"
                )));
            }
        }

        if !(0.0..=2.0).contains(&self.prompt.temperature) {
            return Err(ConfigError::ValidationError(
                "prompt.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.prompt.number_of_predictions == 0 {
            return Err(ConfigError::ValidationError(
                "prompt.number_of_predictions must be at least 1".into(),
            ));
        }

        for (name, model) in &self.models {
            let reserved = model
                .reserved_for_completion
                .unwrap_or(self.reserved_for_completion);
            if reserved >= model.max_context_length {
                return Err(ConfigError::ValidationError(format!(
                    "models.{name}: reserved_for_completion ({reserved}) must be below max_context_length ({})",
                    model.max_context_length
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            reserved_for_completion: default_reserved_for_completion(),
            message_policy: MessagePolicy::default(),
            prompt: PromptConfig::default(),
            retrieval: RetrievalMode::default(),
            memory: MemoryConfig::default(),
            tokenizer: TokenizerConfig::default(),
            models: HashMap::new(),
            logging: LoggingConfig::default(),
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
