//! Exact counting with a HuggingFace `tokenizer.json`.
//!
//! Content is encoded with the loaded tokenizer; chat framing follows the
//! same [`ChatFraming`] rules as the heuristic counter so both report
//! comparable totals.

use std::path::Path;

use contextweave_core::message::Message;
use contextweave_core::tokenizer::Tokenizer;
use tracing::{debug, warn};

use crate::approx::{ApproxTokenizer, ChatFraming};
use crate::TokenizerError;

/// Tokenizer backed by a `tokenizers::Tokenizer` loaded from disk.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    framing: ChatFraming,
    fallback: ApproxTokenizer,
}

impl HfTokenizer {
    /// Load a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| TokenizerError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Loaded tokenizer from {}", path.display());
        Ok(Self {
            inner,
            framing: ChatFraming::default(),
            fallback: ApproxTokenizer::default(),
        })
    }

    pub fn with_framing(mut self, framing: ChatFraming) -> Self {
        self.framing = framing;
        self.fallback = self.fallback.with_framing(framing);
        self
    }

    fn text_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                warn!("Tokenizer failed to encode text, using estimate: {e}");
                self.fallback.estimate_tokens(text)
            }
        }
    }
}

impl Tokenizer for HfTokenizer {
    fn count(&self, messages: &[Message], _model: &str) -> usize {
        if messages.is_empty() {
            return 0;
        }
        let body: usize = messages
            .iter()
            .map(|m| {
                let mut tokens = self.framing.tokens_per_message
                    + self.text_tokens(m.role.as_str())
                    + self.text_tokens(&m.content);
                if let Some(name) = &m.name {
                    tokens += self.framing.tokens_per_name + self.text_tokens(name);
                }
                tokens
            })
            .sum();
        body + self.framing.reply_priming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const WORD_LEVEL: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "user": 0, "hello": 1, "world": 2, "[UNK]": 3 },
            "unk_token": "[UNK]"
        }
    }"#;

    #[test]
    fn counts_words_with_framing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(WORD_LEVEL.as_bytes()).unwrap();

        let tok = HfTokenizer::from_file(file.path()).unwrap();
        // 3 framing + 1 role + 2 content + 3 priming
        assert_eq!(tok.count(&[Message::user("hello world")], "any"), 9);
        assert_eq!(tok.count(&[], "any"), 0);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = HfTokenizer::from_file("/nonexistent/tokenizer.json")
            .err()
            .unwrap();
        assert!(err.to_string().contains("/nonexistent/tokenizer.json"));
    }
}
