//! Heuristic token counting.
//!
//! Uses a character-based estimate: ~4 characters per token, rounded up,
//! plus the chat framing BPE chat models charge on top of the content:
//! a fixed cost per message, one token for the role, extra tokens when a
//! message carries a name, and a reply-priming cost per request.

use contextweave_core::message::Message;
use contextweave_core::tokenizer::Tokenizer;

/// Per-message and per-request framing costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatFraming {
    pub tokens_per_message: usize,
    pub tokens_per_name: usize,
    pub reply_priming: usize,
}

impl Default for ChatFraming {
    fn default() -> Self {
        Self {
            tokens_per_message: 3,
            tokens_per_name: 1,
            reply_priming: 3,
        }
    }
}

/// Character-ratio tokenizer. Same accounting for every model identifier.
#[derive(Debug, Clone)]
pub struct ApproxTokenizer {
    chars_per_token: usize,
    framing: ChatFraming,
}

impl ApproxTokenizer {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
            framing: ChatFraming::default(),
        }
    }

    pub fn with_framing(mut self, framing: ChatFraming) -> Self {
        self.framing = framing;
        self
    }

    /// Estimate the token count for a string. Rounds up.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(self.chars_per_token)
    }

    /// Tokens for one message including its framing, excluding reply priming.
    pub fn message_tokens(&self, message: &Message) -> usize {
        let mut tokens = self.framing.tokens_per_message
            + self.estimate_tokens(message.role.as_str())
            + self.estimate_tokens(&message.content);
        if let Some(name) = &message.name {
            tokens += self.framing.tokens_per_name + self.estimate_tokens(name);
        }
        tokens
    }
}

impl Default for ApproxTokenizer {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Tokenizer for ApproxTokenizer {
    fn count(&self, messages: &[Message], _model: &str) -> usize {
        if messages.is_empty() {
            return 0;
        }
        let body: usize = messages.iter().map(|m| self.message_tokens(m)).sum();
        body + self.framing.reply_priming
    }
}
