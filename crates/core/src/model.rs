//! Model catalog: context limits and capabilities per model identifier.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Completion space reserved by default when a catalog entry does not say
/// otherwise.
pub const DEFAULT_RESERVED_FOR_COMPLETION: usize = 500;

/// Hard token limits of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    /// Maximum tokens the model accepts (prompt + completion).
    pub max_context_length: usize,
    /// Tokens kept free for the model's reply.
    pub reserved_for_completion: usize,
}

impl ModelLimits {
    pub fn new(max_context_length: usize, reserved_for_completion: usize) -> Self {
        Self {
            max_context_length,
            reserved_for_completion,
        }
    }

    /// Token space left for the prompt once the completion reserve is taken.
    pub fn available_tokens(&self) -> usize {
        self.max_context_length
            .saturating_sub(self.reserved_for_completion)
    }
}

/// What kind of request a model can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Plain chat completion; never receives function descriptors.
    PlainChat,
    /// Chat completion with function calling (structured output).
    FunctionCalling,
}

impl ModelKind {
    pub fn supports_functions(&self) -> bool {
        matches!(self, ModelKind::FunctionCalling)
    }
}

/// A resolved model: identifier, limits and capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub limits: ModelLimits,
    pub kind: ModelKind,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, limits: ModelLimits, kind: ModelKind) -> Self {
        Self {
            name: name.into(),
            limits,
            kind,
        }
    }
}

/// Read-only lookup of model specs by identifier.
pub trait ModelCatalog: Send + Sync {
    fn lookup(&self, model: &str) -> Option<ModelSpec>;
}

/// A catalog backed by a fixed table, pre-populated with well-known models.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    models: HashMap<String, ModelSpec>,
}

impl StaticCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Built-in table with the given completion reserve applied to every entry.
    pub fn with_reserved_for_completion(reserved: usize) -> Self {
        use ModelKind::*;
        let known: [(&str, usize, ModelKind); 9] = [
            ("ada", 2049, PlainChat),
            ("babbage", 2049, PlainChat),
            ("curie", 2049, PlainChat),
            ("text-davinci-003", 4097, PlainChat),
            ("gpt-3.5-turbo", 4097, PlainChat),
            ("gpt-3.5-turbo-0613", 4097, FunctionCalling),
            ("gpt-3.5-turbo-16k", 16388, FunctionCalling),
            ("gpt-4", 8192, FunctionCalling),
            ("gpt-4-32k", 32768, FunctionCalling),
        ];

        let mut catalog = Self::empty();
        for (name, max, kind) in known {
            catalog.insert(ModelSpec::new(name, ModelLimits::new(max, reserved), kind));
        }
        catalog
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, spec: ModelSpec) {
        self.models.insert(spec.name.clone(), spec);
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::with_reserved_for_completion(DEFAULT_RESERVED_FOR_COMPLETION)
    }
}

impl ModelCatalog for StaticCatalog {
    fn lookup(&self, model: &str) -> Option<ModelSpec> {
        self.models.get(model).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_tokens_subtracts_reserve() {
        let limits = ModelLimits::new(2049, 500);
        assert_eq!(limits.available_tokens(), 1549);
    }

    #[test]
    fn reserve_larger_than_context_saturates() {
        assert_eq!(ModelLimits::new(100, 500).available_tokens(), 0);
    }

    #[test]
    fn builtin_catalog_knows_ada_and_16k() {
        let catalog = StaticCatalog::default();
        let ada = catalog.lookup("ada").unwrap();
        assert_eq!(ada.limits.max_context_length, 2049);
        assert_eq!(ada.kind, ModelKind::PlainChat);

        let turbo = catalog.lookup("gpt-3.5-turbo-16k").unwrap();
        assert_eq!(turbo.limits.max_context_length, 16388);
        assert!(turbo.kind.supports_functions());

        assert!(catalog.lookup("unknown-model").is_none());
    }

    #[test]
    fn insert_overrides_entry() {
        let mut catalog = StaticCatalog::default();
        catalog.insert(ModelSpec::new(
            "gpt-4",
            ModelLimits::new(128_000, 4096),
            ModelKind::FunctionCalling,
        ));
        assert_eq!(
            catalog.lookup("gpt-4").unwrap().limits.max_context_length,
            128_000
        );
    }
}
