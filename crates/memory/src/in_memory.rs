//! In-memory store for tests and ephemeral sessions.
//!
//! Each conversation owns its own record list behind its own lock, so
//! appends to one conversation are serialized while other conversations
//! proceed independently.

use async_trait::async_trait;
use chrono::Utc;
use contextweave_core::error::MemoryError;
use contextweave_core::memory::{Embedder, MemoryRecord, MemoryStore};
use contextweave_core::message::{ConversationId, Message};
use contextweave_core::tokenizer::TokenMeter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::{vector, window};

type Records = Arc<Mutex<Vec<MemoryRecord>>>;

/// A store that keeps every conversation in process memory.
pub struct InMemoryStore {
    conversations: RwLock<HashMap<ConversationId, Records>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            embedder: None,
        }
    }

    /// Embed every appended message so relevance reads rank by cosine
    /// similarity instead of keyword overlap.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    async fn existing(&self, id: &ConversationId) -> Option<Records> {
        self.conversations.read().await.get(id).cloned()
    }

    async fn slot(&self, id: &ConversationId) -> Records {
        if let Some(records) = self.existing(id).await {
            return records;
        }
        self.conversations
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .clone()
    }

    async fn embed_all(&self, messages: &[Message]) -> Result<Vec<Option<Vec<f32>>>, MemoryError> {
        let Some(embedder) = &self.embedder else {
            return Ok(vec![None; messages.len()]);
        };
        let texts: Vec<String> = messages.iter().map(|m| m.content.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != messages.len() {
            return Err(MemoryError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                messages.len(),
                vectors.len()
            )));
        }
        Ok(vectors.into_iter().map(Some).collect())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> Result<MemoryRecord, MemoryError> {
        let mut records = self.append_all(conversation_id, vec![message]).await?;
        records
            .pop()
            .ok_or_else(|| MemoryError::Unavailable("append produced no record".into()))
    }

    async fn append_all(
        &self,
        conversation_id: &ConversationId,
        messages: Vec<Message>,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        // Embed before taking the lock so a failure leaves nothing behind.
        let embeddings = self.embed_all(&messages).await?;

        let slot = self.slot(conversation_id).await;
        let mut records = slot.lock().await;
        let first = records.len() as u64;

        let appended: Vec<MemoryRecord> = messages
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (message, embedding))| MemoryRecord {
                conversation_id: conversation_id.clone(),
                sequence: first + i as u64,
                approx_token_count: window::approx_tokens(&message),
                message,
                inserted_at: Utc::now(),
                embedding,
            })
            .collect();

        records.extend(appended.iter().cloned());
        debug!(
            conversation = %conversation_id,
            appended = appended.len(),
            total = records.len(),
            "Appended turns"
        );
        Ok(appended)
    }

    async fn windowed_read(
        &self,
        conversation_id: &ConversationId,
        token_budget: usize,
        meter: TokenMeter<'_>,
    ) -> Result<Vec<Message>, MemoryError> {
        let Some(slot) = self.existing(conversation_id).await else {
            return Ok(Vec::new());
        };
        let messages: Vec<Message> = slot.lock().await.iter().map(|r| r.message.clone()).collect();
        Ok(window::recent_window(&messages, token_budget, meter))
    }

    async fn relevance_read(
        &self,
        conversation_id: &ConversationId,
        query: &str,
        token_budget: usize,
        meter: TokenMeter<'_>,
    ) -> Result<Vec<Message>, MemoryError> {
        let Some(slot) = self.existing(conversation_id).await else {
            return Ok(Vec::new());
        };
        let records: Vec<MemoryRecord> = slot.lock().await.clone();
        let messages: Vec<Message> = records.iter().map(|r| r.message.clone()).collect();

        let scores = match &self.embedder {
            Some(embedder) => {
                let query_embedding = embedder
                    .embed(&[query.to_string()])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| MemoryError::EmbeddingFailed("empty query embedding".into()))?;
                vector::embedding_scores(&records, &query_embedding)
            }
            None => messages
                .iter()
                .map(|m| window::keyword_score(query, &m.content))
                .collect(),
        };

        Ok(window::relevant_selection(&messages, &scores, token_budget, meter))
    }

    async fn turn_count(&self, conversation_id: &ConversationId) -> Result<usize, MemoryError> {
        match self.existing(conversation_id).await {
            Some(slot) => Ok(slot.lock().await.len()),
            None => Ok(0),
        }
    }

    async fn purge(&self, conversation_id: &ConversationId) -> Result<usize, MemoryError> {
        let removed = self.conversations.write().await.remove(conversation_id);
        match removed {
            Some(slot) => Ok(slot.lock().await.len()),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextweave_core::tokenizer::Tokenizer;

    struct PerMessage;

    impl Tokenizer for PerMessage {
        fn count(&self, messages: &[Message], _model: &str) -> usize {
            messages.len()
        }
    }

    /// Embeds text as [mentions "rust", mentions "python"].
    struct TopicEmbedder;

    #[async_trait]
    impl Embedder for TopicEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("rust") { 1.0 } else { 0.0 },
                        if t.contains("python") { 1.0 } else { 0.0 },
                    ]
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
            Err(MemoryError::EmbeddingFailed("offline".into()))
        }
    }

    fn meter() -> TokenMeter<'static> {
        TokenMeter::new(&PerMessage, "test")
    }

    #[tokio::test]
    async fn append_assigns_sequences() {
        let store = InMemoryStore::new();
        let id = ConversationId::new();
        let first = store.append(&id, Message::user("one")).await.unwrap();
        let second = store.append(&id, Message::assistant("two")).await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(store.turn_count(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_conversation_reads_empty() {
        let store = InMemoryStore::new();
        let id = ConversationId::new();
        assert!(store.windowed_read(&id, 1000, meter()).await.unwrap().is_empty());
        assert!(store.relevance_read(&id, "q", 1000, meter()).await.unwrap().is_empty());
        assert_eq!(store.turn_count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn windowed_read_returns_recent_in_order() {
        let store = InMemoryStore::new();
        let id = ConversationId::new();
        for i in 0..5 {
            store.append(&id, Message::user(format!("m{i}"))).await.unwrap();
        }
        let window = store.windowed_read(&id, 2, meter()).await.unwrap();
        assert_eq!(window, vec![Message::user("m3"), Message::user("m4")]);

        // Idempotent for a fixed store state.
        assert_eq!(store.windowed_read(&id, 2, meter()).await.unwrap(), window);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let store = InMemoryStore::new();
        let a = ConversationId::new();
        let b = ConversationId::new();
        store.append(&a, Message::user("for a")).await.unwrap();
        store.append(&b, Message::user("for b")).await.unwrap();

        let window = store.windowed_read(&a, 10, meter()).await.unwrap();
        assert_eq!(window, vec![Message::user("for a")]);
    }

    #[tokio::test]
    async fn concurrent_appends_keep_dense_sequences() {
        let store = Arc::new(InMemoryStore::new());
        let id = ConversationId::new();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_all(
                        &id,
                        vec![Message::user(format!("q{i}")), Message::assistant(format!("a{i}"))],
                    )
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            let pair = handle.await.unwrap();
            // Each turn's two records stay adjacent.
            assert_eq!(pair[1].sequence, pair[0].sequence + 1);
            assert_eq!(pair[0].message.content[1..], pair[1].message.content[1..]);
        }
        assert_eq!(store.turn_count(&id).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn keyword_relevance_without_embedder() {
        let store = InMemoryStore::new();
        let id = ConversationId::new();
        store.append(&id, Message::user("Tell me about Rust lifetimes")).await.unwrap();
        store.append(&id, Message::user("What is the weather")).await.unwrap();
        store.append(&id, Message::user("Anything else")).await.unwrap();

        let picked = store
            .relevance_read(&id, "rust lifetimes", 1, meter())
            .await
            .unwrap();
        assert_eq!(picked, vec![Message::user("Tell me about Rust lifetimes")]);
    }

    #[tokio::test]
    async fn embedding_relevance_ranks_by_cosine() {
        let store = InMemoryStore::new().with_embedder(Arc::new(TopicEmbedder));
        let id = ConversationId::new();
        store.append(&id, Message::user("python packaging")).await.unwrap();
        store.append(&id, Message::user("rust traits")).await.unwrap();
        store.append(&id, Message::user("python typing")).await.unwrap();

        let picked = store.relevance_read(&id, "RUST", 1, meter()).await.unwrap();
        assert_eq!(picked, vec![Message::user("rust traits")]);
    }

    #[tokio::test]
    async fn failed_embedding_stores_nothing() {
        let store = InMemoryStore::new().with_embedder(Arc::new(BrokenEmbedder));
        let id = ConversationId::new();
        let err = store.append(&id, Message::user("hi")).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingFailed(_)));
        assert_eq!(store.turn_count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_removes_conversation() {
        let store = InMemoryStore::new();
        let id = ConversationId::new();
        store.append(&id, Message::user("x")).await.unwrap();
        store.append(&id, Message::user("y")).await.unwrap();
        assert_eq!(store.purge(&id).await.unwrap(), 2);
        assert_eq!(store.turn_count(&id).await.unwrap(), 0);
        assert_eq!(store.purge(&id).await.unwrap(), 0);
    }
}
