//! SQLite store for durable conversation history.
//!
//! One table, `memory_records`, keyed by `(conversation_id, seq)`. Writes go
//! through a single in-process lock and one transaction per append batch,
//! so a turn's messages land contiguously or not at all.

use crate::window;
use async_trait::async_trait;
use chrono::Utc;
use contextweave_core::error::MemoryError;
use contextweave_core::memory::{MemoryRecord, MemoryStore};
use contextweave_core::message::{ConversationId, Message, Role};
use contextweave_core::tokenizer::TokenMeter;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A SQLite-backed [`MemoryStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) a database at `path`.
    ///
    /// `":memory:"` gives an ephemeral database on a single connection.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let ephemeral = path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(if ephemeral { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite memory store initialized at {path}");
        Ok(store)
    }

    /// Wrap an existing pool, creating the schema if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_records (
                iid             INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                seq             INTEGER NOT NULL,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                name            TEXT,
                inserted_at     TEXT NOT NULL,
                approx_tokens   INTEGER NOT NULL,
                UNIQUE (conversation_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("memory_records table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn load_messages(&self, id: &ConversationId) -> Result<Vec<Message>, MemoryError> {
        let rows = sqlx::query(
            "SELECT role, content, name FROM memory_records WHERE conversation_id = ? ORDER BY seq ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::Unavailable(format!("history read: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, MemoryError> {
        let role: String = row
            .try_get("role")
            .map_err(|e| MemoryError::Corrupt(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::Corrupt(format!("content column: {e}")))?;
        let name: Option<String> = row
            .try_get("name")
            .map_err(|e| MemoryError::Corrupt(format!("name column: {e}")))?;

        let role = Role::from_str(&role).map_err(MemoryError::Corrupt)?;
        Ok(Message {
            role,
            content,
            name,
        })
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
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
        let _guard = self.write_lock.lock().await;
        let unavailable = |e: sqlx::Error| MemoryError::Unavailable(format!("append: {e}"));

        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let next: i64 = sqlx::query(
            "SELECT COALESCE(MAX(seq) + 1, 0) AS next FROM memory_records WHERE conversation_id = ?",
        )
        .bind(conversation_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(unavailable)?
        .try_get("next")
        .map_err(unavailable)?;

        let mut records = Vec::with_capacity(messages.len());
        for (offset, message) in messages.into_iter().enumerate() {
            let sequence = next + offset as i64;
            let inserted_at = Utc::now();
            let approx = window::approx_tokens(&message);

            sqlx::query(
                r#"
                INSERT INTO memory_records
                    (conversation_id, seq, role, content, name, inserted_at, approx_tokens)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(conversation_id.as_str())
            .bind(sequence)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(message.name.as_deref())
            .bind(inserted_at.to_rfc3339())
            .bind(approx as i64)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

            records.push(MemoryRecord {
                conversation_id: conversation_id.clone(),
                sequence: sequence as u64,
                message,
                inserted_at,
                approx_token_count: approx,
                embedding: None,
            });
        }

        tx.commit().await.map_err(unavailable)?;
        debug!(conversation = %conversation_id, appended = records.len(), "Appended turns");
        Ok(records)
    }

    async fn windowed_read(
        &self,
        conversation_id: &ConversationId,
        token_budget: usize,
        meter: TokenMeter<'_>,
    ) -> Result<Vec<Message>, MemoryError> {
        let messages = self.load_messages(conversation_id).await?;
        Ok(window::recent_window(&messages, token_budget, meter))
    }

    async fn relevance_read(
        &self,
        conversation_id: &ConversationId,
        query: &str,
        token_budget: usize,
        meter: TokenMeter<'_>,
    ) -> Result<Vec<Message>, MemoryError> {
        let messages = self.load_messages(conversation_id).await?;
        let scores: Vec<f32> = messages
            .iter()
            .map(|m| window::keyword_score(query, &m.content))
            .collect();
        Ok(window::relevant_selection(&messages, &scores, token_budget, meter))
    }

    async fn turn_count(&self, conversation_id: &ConversationId) -> Result<usize, MemoryError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM memory_records WHERE conversation_id = ?",
        )
        .bind(conversation_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MemoryError::Unavailable(format!("count: {e}")))?
        .try_get("n")
        .map_err(|e| MemoryError::Corrupt(format!("count column: {e}")))?;
        Ok(count as usize)
    }

    async fn purge(&self, conversation_id: &ConversationId) -> Result<usize, MemoryError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM memory_records WHERE conversation_id = ?")
            .bind(conversation_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Unavailable(format!("purge: {e}")))?;
        Ok(result.rows_affected() as usize)
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

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("memory.db").display());
        let store = SqliteStore::new(&path).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn append_and_window() {
        let (_dir, store) = temp_store().await;
        let id = ConversationId::new();
        for i in 0..4 {
            store.append(&id, Message::user(format!("q{i}"))).await.unwrap();
        }

        let meter = TokenMeter::new(&PerMessage, "test");
        let window = store.windowed_read(&id, 2, meter).await.unwrap();
        assert_eq!(window, vec![Message::user("q2"), Message::user("q3")]);
        assert_eq!(store.turn_count(&id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn append_all_is_contiguous() {
        let (_dir, store) = temp_store().await;
        let id = ConversationId::new();
        store.append(&id, Message::system("ignored by sequencing")).await.unwrap();
        let records = store
            .append_all(
                &id,
                vec![
                    Message::user("question"),
                    Message::function("lookup", "{}"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[1].sequence, 2);

        let meter = TokenMeter::new(&PerMessage, "test");
        let all = store.windowed_read(&id, 10, meter).await.unwrap();
        assert_eq!(all[2], Message::function("lookup", "{}"));
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("memory.db").display());
        let id = ConversationId::from("persistent");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.append(&id, Message::user("remember me")).await.unwrap();
        }

        let store = SqliteStore::new(&path).await.unwrap();
        assert_eq!(store.turn_count(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        let (_dir, store) = temp_store().await;
        let meter = TokenMeter::new(&PerMessage, "test");
        let id = ConversationId::new();
        assert!(store.windowed_read(&id, 100, meter).await.unwrap().is_empty());
        assert_eq!(store.purge(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn keyword_relevance_read() {
        let (_dir, store) = temp_store().await;
        let id = ConversationId::new();
        store.append(&id, Message::user("sqlite journal modes")).await.unwrap();
        store.append(&id, Message::user("lunch plans")).await.unwrap();

        let meter = TokenMeter::new(&PerMessage, "test");
        let picked = store.relevance_read(&id, "journal", 1, meter).await.unwrap();
        assert_eq!(picked, vec![Message::user("sqlite journal modes")]);
    }
}
