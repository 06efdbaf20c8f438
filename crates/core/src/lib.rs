//! # contextweave Core
//!
//! Domain types, traits, and error definitions for the contextweave
//! context assembly engine. This crate has **no runtime dependencies** on
//! storage, tokenizers, or model wire clients; it defines the domain model
//! that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the engine is a trait here:
//! - [`Tokenizer`] counts tokens for a model
//! - [`MemoryStore`] persists and windows conversation history
//! - [`ModelCatalog`] resolves model limits and capabilities
//! - [`ModelClient`] issues chat requests
//! - [`Embedder`] produces vectors for relevance-ranked history reads
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted stubs without touching the engine.

pub mod error;
pub mod memory;
pub mod message;
pub mod model;
pub mod policy;
pub mod prompt;
pub mod provider;
pub mod tokenizer;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, PolicyError, ProviderError, ResponseDecodeError, Result};
pub use memory::{Embedder, MemoryRecord, MemoryStore, RetrievalMode};
pub use message::{ConversationId, Message, Role};
pub use model::{ModelCatalog, ModelKind, ModelLimits, ModelSpec, StaticCatalog};
pub use policy::MessagePolicy;
pub use prompt::{Prompt, PromptBuilder, PromptConfig};
pub use provider::{
    ChatChoice, ChatRequest, ChatResponse, FunctionCall, FunctionCallTarget, FunctionDefinition,
    ModelClient, StreamChunk, Usage,
};
pub use tokenizer::{TokenMeter, Tokenizer};
