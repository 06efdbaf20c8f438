//! Memory store trait: per-conversation history with budgeted reads.
//!
//! The store keeps every turn of every conversation in insertion order and
//! answers two kinds of reads:
//! - **Windowed** (baseline): the most recent turns that fit a token budget
//! - **Relevance** (optional): the turns most related to a query that fit
//!   a token budget
//!
//! Both reads return messages in chronological order, ready to be spliced
//! into a request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::{ConversationId, Message};
use crate::tokenizer::TokenMeter;

/// A stored turn. Created on append, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Conversation this turn belongs to
    pub conversation_id: ConversationId,

    /// Position within the conversation, starting at 0
    pub sequence: u64,

    /// The stored message
    pub message: Message,

    /// When the record was written
    pub inserted_at: DateTime<Utc>,

    /// Rough token cost, for diagnostics only. Budgeted reads always
    /// recount through the caller's tokenizer.
    pub approx_token_count: usize,

    /// Optional embedding used by relevance reads
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// The core MemoryStore trait.
///
/// Implementations: in-memory (tests, ephemeral sessions) and SQLite.
///
/// Appends to a single conversation must be linearized by the store;
/// appends to different conversations need no coordination.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The store name (e.g., "in_memory", "sqlite").
    fn name(&self) -> &str;

    /// Append one message after every prior record of the conversation.
    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> Result<MemoryRecord, MemoryError>;

    /// Append several messages as one unit: either all are stored,
    /// contiguously, or none are.
    ///
    /// The default appends one by one and is only atomic for stores whose
    /// `append` cannot fail midway; real stores override it.
    async fn append_all(
        &self,
        conversation_id: &ConversationId,
        messages: Vec<Message>,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let mut records = Vec::with_capacity(messages.len());
        for message in messages {
            records.push(self.append(conversation_id, message).await?);
        }
        Ok(records)
    }

    /// The longest suffix of the conversation whose cost, counted by
    /// `meter` over exactly the returned messages, fits in `token_budget`.
    ///
    /// Unknown conversations return an empty list.
    async fn windowed_read(
        &self,
        conversation_id: &ConversationId,
        token_budget: usize,
        meter: TokenMeter<'_>,
    ) -> Result<Vec<Message>, MemoryError>;

    /// Messages ranked by relevance to `query`, selected greedily within
    /// `token_budget` and returned chronologically.
    ///
    /// Stores without a relevance index fall back to the recency window.
    async fn relevance_read(
        &self,
        conversation_id: &ConversationId,
        query: &str,
        token_budget: usize,
        meter: TokenMeter<'_>,
    ) -> Result<Vec<Message>, MemoryError> {
        let _ = query;
        self.windowed_read(conversation_id, token_budget, meter).await
    }

    /// Number of records stored for the conversation.
    async fn turn_count(&self, conversation_id: &ConversationId) -> Result<usize, MemoryError>;

    /// Delete every record of the conversation. Returns how many were removed.
    async fn purge(&self, conversation_id: &ConversationId) -> Result<usize, MemoryError>;
}

/// How history is picked for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Most recent turns that fit (baseline)
    #[default]
    Recency,
    /// Turns most related to the new prompt that fit
    Relevance,
}

/// Produces embedding vectors for relevance-ranked reads.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serialization_skips_embedding() {
        let record = MemoryRecord {
            conversation_id: ConversationId::from("conv_1"),
            sequence: 3,
            message: Message::user("The user prefers Rust"),
            inserted_at: Utc::now(),
            approx_token_count: 9,
            embedding: Some(vec![0.1, 0.2]),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("prefers Rust"));
        assert!(json.contains("\"sequence\":3"));
        assert!(!json.contains("embedding"));
    }
}
