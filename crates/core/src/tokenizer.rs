//! Tokenizer trait: model-specific token accounting.
//!
//! Budget correctness depends on counts that match what the model provider
//! charges, so the engine never estimates on its own: every cost goes
//! through a [`Tokenizer`].

use crate::message::Message;

/// Counts the tokens a sequence of messages costs for a model.
///
/// `count` is over the exact sequence, including any per-request framing,
/// so `count(&[])` is expected to be `0`.
pub trait Tokenizer: Send + Sync {
    fn count(&self, messages: &[Message], model: &str) -> usize;
}

/// A tokenizer bound to one model identifier.
#[derive(Clone, Copy)]
pub struct TokenMeter<'a> {
    tokenizer: &'a dyn Tokenizer,
    model: &'a str,
}

impl<'a> TokenMeter<'a> {
    pub fn new(tokenizer: &'a dyn Tokenizer, model: &'a str) -> Self {
        Self { tokenizer, model }
    }

    pub fn count(&self, messages: &[Message]) -> usize {
        self.tokenizer.count(messages, self.model)
    }

    pub fn model(&self) -> &str {
        self.model
    }
}

impl std::fmt::Debug for TokenMeter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenMeter").field("model", &self.model).finish()
    }
}
