//! Error types for the contextweave domain.
//!
//! Each bounded context (policy, memory, provider, decoding) has its own
//! error type; [`Error`] rolls them up for the engine's callers.

use thiserror::Error;

/// The top-level error type for all engine operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Policy errors ---
    #[error("Invalid message policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    // --- Assembly errors ---
    #[error(
        "Prompt needs {prompt_tokens} tokens but the context budget is {context_budget} tokens"
    )]
    PromptExceedsContextBudget {
        prompt_tokens: usize,
        context_budget: usize,
    },

    /// The final request does not fit the model's available space.
    ///
    /// History and context budgets are independent ceilings whose sum may
    /// exceed the available space, so a valid policy can trigger this when
    /// both parts are close to full. `history_tokens + context_tokens`
    /// above `available_tokens` points at the policy; a sum within it
    /// means the tokenizer counts the whole above its parts.
    #[error(
        "Assembled request costs {total_tokens} tokens (history {history_tokens}, prompt {context_tokens}), above the {available_tokens} available"
    )]
    TokenBudgetInvariantViolated {
        total_tokens: usize,
        history_tokens: usize,
        context_tokens: usize,
        available_tokens: usize,
    },

    // --- Memory errors ---
    #[error("Memory store unavailable: {0}")]
    StoreUnavailable(#[from] MemoryError),

    // --- Response decoding ---
    #[error(transparent)]
    ResponseDecode(#[from] ResponseDecodeError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: i64 },

    #[error("{field} must be between 0 and 100 (got {value})")]
    PercentOutOfRange { field: &'static str, value: i64 },

    #[error("{field} must be at most {max} (got {value})")]
    TooLarge {
        field: &'static str,
        value: i64,
        max: u32,
    },
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Unavailable(String),

    #[error("Stored record is malformed: {0}")]
    Corrupt(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider returned no choices")]
    EmptyResponse,

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// A structured response could not be decoded into the requested type.
///
/// The raw payload is kept verbatim for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("Failed to decode structured response: {reason} (raw: {raw})")]
pub struct ResponseDecodeError {
    pub reason: String,
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_error_displays_both_numbers() {
        let err = Error::PromptExceedsContextBudget {
            prompt_tokens: 900,
            context_budget: 512,
        };
        let msg = err.to_string();
        assert!(msg.contains("900"));
        assert!(msg.contains("512"));
    }

    #[test]
    fn decode_error_keeps_raw_payload() {
        let err: Error = ResponseDecodeError {
            reason: "expected value at line 1".into(),
            raw: "not json".into(),
        }
        .into();
        assert!(err.to_string().contains("not json"));
        assert!(matches!(err, Error::ResponseDecode(ref e) if e.raw == "not json"));
    }

    #[test]
    fn memory_error_converts_to_store_unavailable() {
        let err: Error = MemoryError::Unavailable("disk full".into()).into();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
