//! Wiring engine components from [`EngineConfig`].

use crate::engine::Engine;
use contextweave_config::{ConfigError, EngineConfig, MemoryConfig, TokenizerConfig};
use contextweave_core::error::MemoryError;
use contextweave_core::memory::MemoryStore;
use contextweave_core::model::{ModelLimits, ModelSpec, StaticCatalog};
use contextweave_core::provider::ModelClient;
use contextweave_core::tokenizer::Tokenizer;
use contextweave_memory::{InMemoryStore, SqliteStore};
use contextweave_tokenizer::{ApproxTokenizer, TokenizerError};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Errors raised while building an engine from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Memory store setup failed: {0}")]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
}

/// Open the configured memory store.
pub async fn open_store(config: &MemoryConfig) -> Result<Arc<dyn MemoryStore>, SetupError> {
    match config.backend.as_str() {
        "in_memory" => Ok(Arc::new(InMemoryStore::new())),
        "sqlite" => {
            ensure_parent_dir(&config.path)?;
            Ok(Arc::new(SqliteStore::new(&config.path).await?))
        }
        other => Err(ConfigError::ValidationError(format!("unknown memory backend \"{other}\"")).into()),
    }
}

fn ensure_parent_dir(url: &str) -> Result<(), MemoryError> {
    let path = url.strip_prefix("sqlite://").unwrap_or(url);
    if path.contains(":memory:") {
        return Ok(());
    }
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            MemoryError::Unavailable(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    Ok(())
}

/// Build the configured tokenizer.
pub fn build_tokenizer(config: &TokenizerConfig) -> Result<Arc<dyn Tokenizer>, SetupError> {
    match config.kind.as_str() {
        "approx" => Ok(Arc::new(ApproxTokenizer::new(config.chars_per_token))),
        "hf" => {
            let path = config.path.as_ref().ok_or_else(|| {
                ConfigError::ValidationError("tokenizer.path is required for hf".into())
            })?;
            hf_tokenizer(path)
        }
        other => Err(TokenizerError::Unavailable(other.to_string()).into()),
    }
}

#[cfg(feature = "hf")]
fn hf_tokenizer(path: &Path) -> Result<Arc<dyn Tokenizer>, SetupError> {
    Ok(Arc::new(contextweave_tokenizer::HfTokenizer::from_file(path)?))
}

#[cfg(not(feature = "hf"))]
fn hf_tokenizer(_path: &Path) -> Result<Arc<dyn Tokenizer>, SetupError> {
    Err(TokenizerError::Unavailable("hf".into()).into())
}

/// The built-in catalog with the configured reserve, plus configured models.
pub fn build_catalog(config: &EngineConfig) -> StaticCatalog {
    let mut catalog = StaticCatalog::with_reserved_for_completion(config.reserved_for_completion);
    for (name, entry) in &config.models {
        let reserved = entry
            .reserved_for_completion
            .unwrap_or(config.reserved_for_completion);
        catalog.insert(ModelSpec::new(
            name.clone(),
            ModelLimits::new(entry.max_context_length, reserved),
            entry.kind,
        ));
    }
    catalog
}

impl Engine {
    /// Build an engine from configuration around the given model client.
    pub async fn from_config(
        config: &EngineConfig,
        client: Arc<dyn ModelClient>,
    ) -> Result<Self, SetupError> {
        config.validate()?;

        let store = open_store(&config.memory).await?;
        let tokenizer = build_tokenizer(&config.tokenizer)?;
        let catalog = build_catalog(config);
        info!(
            store = store.name(),
            models = catalog.len(),
            retrieval = ?config.retrieval,
            "Engine configured"
        );

        Ok(Engine::new(store, tokenizer, Arc::new(catalog), client)
            .with_policy(config.message_policy)
            .with_prompt_config(config.prompt.clone())
            .with_retrieval(config.retrieval)
            .with_default_model(config.default_model.clone()))
    }
}
