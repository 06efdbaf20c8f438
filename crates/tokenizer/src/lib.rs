//! Tokenizer implementations for contextweave.
//!
//! - [`ApproxTokenizer`]: dependency-free character-ratio estimate
//! - `HfTokenizer` (feature `hf`): exact counts from a HuggingFace
//!   `tokenizer.json`

pub mod approx;

#[cfg(feature = "hf")]
pub mod hf;

use std::path::PathBuf;

pub use approx::{ApproxTokenizer, ChatFraming};

#[cfg(feature = "hf")]
pub use hf::HfTokenizer;

/// Errors raised while building a tokenizer.
#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("Failed to load tokenizer from {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Tokenizer kind '{0}' is not available in this build")]
    Unavailable(String),
}
