//! Context assembly: decides which messages go into a request.
//!
//! For every outgoing request the assembler:
//!
//! 1. Splits the model's available token space into a **history** budget
//!    (a fraction plus retrieval padding) and a **context** budget for the
//!    caller's in-flight prompt, using [`MessagePolicy`]
//! 2. Reads the longest recent window of stored history that fits the
//!    history budget (or the most relevant turns, in relevance mode)
//! 3. Rejects prompts that do not fit the context budget. Caller content
//!    is never truncated.
//! 4. Orders the result: prompt system messages, history, then the rest of
//!    the prompt
//! 5. Recounts the final sequence and rejects anything above the model's
//!    available space
//!
//! Assembly is read-only. Abandoning it at any point leaves the store
//! untouched.

use contextweave_core::error::{Error, Result};
use contextweave_core::memory::{MemoryStore, RetrievalMode};
use contextweave_core::message::{ConversationId, Message};
use contextweave_core::model::ModelSpec;
use contextweave_core::policy::MessagePolicy;
use contextweave_core::tokenizer::{TokenMeter, Tokenizer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The ordered messages of one request, ready for the request shaper.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// System messages, then history, then the new turn
    pub messages: Vec<Message>,
    pub metadata: AssemblyMetadata,
}

/// Budgets and costs computed while assembling one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// `max_context_length - reserved_for_completion`
    pub available_tokens: usize,
    pub history_budget: usize,
    pub context_budget: usize,
    /// Cost of the included history on its own
    pub history_tokens: usize,
    /// Cost of the caller's prompt on its own
    pub context_tokens: usize,
    /// Cost of the final sequence
    pub total_tokens: usize,
    /// History messages that made it into the request
    pub history_included: usize,
    /// History messages stored for the conversation
    pub history_stored: usize,
    /// Whether older (or less relevant) history was left out
    pub truncated: bool,
}

impl AssemblyMetadata {
    /// Share of the available space used by the request (0.0–100.0).
    pub fn utilization_pct(&self) -> f32 {
        if self.available_tokens == 0 {
            return 0.0;
        }
        self.total_tokens as f32 / self.available_tokens as f32 * 100.0
    }
}

/// Builds request message lists from stored history and a new prompt.
pub struct ContextAssembler {
    store: Arc<dyn MemoryStore>,
    tokenizer: Arc<dyn Tokenizer>,
    retrieval: RetrievalMode,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn MemoryStore>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            store,
            tokenizer,
            retrieval: RetrievalMode::Recency,
        }
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalMode) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn retrieval(&self) -> RetrievalMode {
        self.retrieval
    }

    /// Assemble the messages for one request to `model`.
    ///
    /// Fails with [`Error::PromptExceedsContextBudget`] when the prompt
    /// alone is over its budget. Fails with
    /// [`Error::TokenBudgetInvariantViolated`] when the final request is
    /// over the available space. With a policy whose budgets sum above
    /// 100% (the default pads history by 100 tokens) that happens for a
    /// nearly full prompt on a long conversation; lower `context_percent`
    /// or the padding to rule it out.
    pub async fn assemble(
        &self,
        conversation_id: &ConversationId,
        new_prompt: &[Message],
        policy: &MessagePolicy,
        model: &ModelSpec,
    ) -> Result<AssembledContext> {
        let meter = TokenMeter::new(self.tokenizer.as_ref(), &model.name);

        let available_tokens = model.limits.available_tokens();
        let history_budget = policy.history_budget(available_tokens);
        let context_budget = policy.context_budget(available_tokens);
        debug!(
            model = %model.name,
            available_tokens,
            history_budget,
            context_budget,
            "Computed token budgets"
        );

        let history = self
            .read_history(conversation_id, new_prompt, history_budget, meter)
            .await?;

        let context_tokens = meter.count(new_prompt);
        if context_tokens > context_budget {
            return Err(Error::PromptExceedsContextBudget {
                prompt_tokens: context_tokens,
                context_budget,
            });
        }

        let history_tokens = meter.count(&history);
        let history_included = history.len();
        let history_stored = self.store.turn_count(conversation_id).await?;

        let (system, turn): (Vec<&Message>, Vec<&Message>) =
            new_prompt.iter().partition(|m| m.is_system());
        let mut messages = Vec::with_capacity(new_prompt.len() + history.len());
        messages.extend(system.into_iter().cloned());
        messages.extend(history);
        messages.extend(turn.into_iter().cloned());

        let total_tokens = meter.count(&messages);
        if total_tokens > available_tokens {
            return Err(Error::TokenBudgetInvariantViolated {
                total_tokens,
                history_tokens,
                context_tokens,
                available_tokens,
            });
        }

        let metadata = AssemblyMetadata {
            available_tokens,
            history_budget,
            context_budget,
            history_tokens,
            context_tokens,
            total_tokens,
            history_included,
            history_stored,
            truncated: history_included < history_stored,
        };
        debug!(
            conversation = %conversation_id,
            history_included,
            history_stored,
            total_tokens,
            "Assembled context"
        );

        Ok(AssembledContext { messages, metadata })
    }

    async fn read_history(
        &self,
        conversation_id: &ConversationId,
        new_prompt: &[Message],
        budget: usize,
        meter: TokenMeter<'_>,
    ) -> Result<Vec<Message>> {
        let history = match self.retrieval {
            RetrievalMode::Recency => {
                self.store
                    .windowed_read(conversation_id, budget, meter)
                    .await?
            }
            RetrievalMode::Relevance => {
                let query = relevance_query(new_prompt);
                if query.is_empty() {
                    self.store
                        .windowed_read(conversation_id, budget, meter)
                        .await?
                } else {
                    self.store
                        .relevance_read(conversation_id, &query, budget, meter)
                        .await?
                }
            }
        };
        Ok(history)
    }
}

/// Text of the prompt's non-system messages, used as the relevance query.
fn relevance_query(new_prompt: &[Message]) -> String {
    new_prompt
        .iter()
        .filter(|m| !m.is_system())
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::PerMessage;
    use contextweave_core::error::MemoryError;
    use contextweave_core::memory::MemoryRecord;
    use contextweave_core::model::{ModelKind, ModelLimits};
    use contextweave_memory::InMemoryStore;

    fn spec(max: usize, reserved: usize) -> ModelSpec {
        ModelSpec::new("test-model", ModelLimits::new(max, reserved), ModelKind::PlainChat)
    }

    fn policy(history: i64, padding: i64, context: i64) -> MessagePolicy {
        MessagePolicy::new(history, padding, context).unwrap()
    }

    async fn store_with(id: &ConversationId, n: usize) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..n {
            store.append(id, Message::user(format!("q{i}"))).await.unwrap();
            store
                .append(id, Message::assistant(format!("a{i}")))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn small_history_is_included_entirely() {
        let id = ConversationId::new();
        let store = store_with(&id, 3).await;
        let assembler = ContextAssembler::new(store, Arc::new(PerMessage));

        let prompt = [Message::user("next")];
        let ctx = assembler
            .assemble(&id, &prompt, &policy(50, 0, 50), &spec(120, 20))
            .await
            .unwrap();

        assert_eq!(ctx.messages.len(), 7);
        assert_eq!(ctx.messages.last(), Some(&Message::user("next")));
        assert_eq!(ctx.metadata.history_included, 6);
        assert_eq!(ctx.metadata.history_stored, 6);
        assert!(!ctx.metadata.truncated);
    }

    #[tokio::test]
    async fn long_history_is_windowed() {
        let id = ConversationId::new();
        let store = store_with(&id, 10).await;
        let assembler = ContextAssembler::new(store, Arc::new(PerMessage));

        // available 10, history 5, context 5
        let ctx = assembler
            .assemble(&id, &[Message::user("next")], &policy(50, 0, 50), &spec(30, 20))
            .await
            .unwrap();

        assert_eq!(ctx.metadata.history_budget, 5);
        assert_eq!(ctx.metadata.history_included, 5);
        assert_eq!(ctx.metadata.history_stored, 20);
        assert!(ctx.metadata.truncated);
        // Most recent history, oldest first
        assert_eq!(ctx.messages[0], Message::assistant("a7"));
        assert_eq!(ctx.messages[4], Message::assistant("a9"));
        assert!(ctx.metadata.total_tokens <= ctx.metadata.available_tokens);
    }

    #[tokio::test]
    async fn system_messages_lead_and_turn_messages_trail() {
        let id = ConversationId::new();
        let store = store_with(&id, 1).await;
        let assembler = ContextAssembler::new(store, Arc::new(PerMessage));

        let prompt = [
            Message::system("be brief"),
            Message::user("question"),
            Message::system("answer in French"),
        ];
        let ctx = assembler
            .assemble(&id, &prompt, &policy(50, 0, 50), &spec(100, 0))
            .await
            .unwrap();

        assert_eq!(
            ctx.messages,
            vec![
                Message::system("be brief"),
                Message::system("answer in French"),
                Message::user("q0"),
                Message::assistant("a0"),
                Message::user("question"),
            ]
        );
    }

    #[tokio::test]
    async fn oversized_prompt_is_rejected_not_truncated() {
        let id = ConversationId::new();
        let assembler = ContextAssembler::new(Arc::new(InMemoryStore::new()), Arc::new(PerMessage));

        let prompt: Vec<Message> = (0..6).map(|i| Message::user(format!("p{i}"))).collect();
        let err = assembler
            .assemble(&id, &prompt, &policy(50, 0, 50), &spec(30, 20))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::PromptExceedsContextBudget {
                prompt_tokens: 6,
                context_budget: 5
            }
        ));
    }

    #[tokio::test]
    async fn overlapping_budgets_fail_the_final_check() {
        let id = ConversationId::new();
        let store = store_with(&id, 10).await;
        let assembler = ContextAssembler::new(store, Arc::new(PerMessage));

        // available 10: history 8 + padding 2 = 10, context 8
        let prompt: Vec<Message> = (0..3).map(|i| Message::user(format!("p{i}"))).collect();
        let err = assembler
            .assemble(&id, &prompt, &policy(80, 2, 80), &spec(30, 20))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::TokenBudgetInvariantViolated {
                total_tokens: 13,
                history_tokens: 10,
                context_tokens: 3,
                available_tokens: 10
            }
        ));
    }

    #[tokio::test]
    async fn unknown_conversation_yields_prompt_only() {
        let assembler = ContextAssembler::new(Arc::new(InMemoryStore::new()), Arc::new(PerMessage));
        let ctx = assembler
            .assemble(
                &ConversationId::new(),
                &[Message::user("hi")],
                &MessagePolicy::default(),
                &spec(100, 10),
            )
            .await
            .unwrap();
        assert_eq!(ctx.messages, vec![Message::user("hi")]);
        assert_eq!(ctx.metadata.history_stored, 0);
        assert!(!ctx.metadata.truncated);
    }

    #[tokio::test]
    async fn relevance_mode_uses_prompt_as_query() {
        let id = ConversationId::new();
        let store = Arc::new(InMemoryStore::new());
        store.append(&id, Message::user("my cat is called Miso")).await.unwrap();
        store.append(&id, Message::user("the weather is grey")).await.unwrap();
        store.append(&id, Message::user("lunch was pasta")).await.unwrap();

        let assembler = ContextAssembler::new(store, Arc::new(PerMessage))
            .with_retrieval(RetrievalMode::Relevance);

        // history budget 1: only the best match fits
        let ctx = assembler
            .assemble(
                &id,
                &[Message::user("what is my cat called?")],
                &policy(5, 0, 50),
                &spec(20, 0),
            )
            .await
            .unwrap();

        assert_eq!(ctx.messages[0], Message::user("my cat is called Miso"));
        assert_eq!(ctx.metadata.history_included, 1);
        assert!(ctx.metadata.truncated);
    }

    struct Offline;

    #[async_trait::async_trait]
    impl MemoryStore for Offline {
        fn name(&self) -> &str {
            "offline"
        }
        async fn append(
            &self,
            _: &ConversationId,
            _: Message,
        ) -> std::result::Result<MemoryRecord, MemoryError> {
            Err(MemoryError::Unavailable("offline".into()))
        }
        async fn windowed_read(
            &self,
            _: &ConversationId,
            _: usize,
            _: TokenMeter<'_>,
        ) -> std::result::Result<Vec<Message>, MemoryError> {
            Err(MemoryError::Unavailable("offline".into()))
        }
        async fn turn_count(&self, _: &ConversationId) -> std::result::Result<usize, MemoryError> {
            Err(MemoryError::Unavailable("offline".into()))
        }
        async fn purge(&self, _: &ConversationId) -> std::result::Result<usize, MemoryError> {
            Err(MemoryError::Unavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_store_unavailable() {
        let assembler = ContextAssembler::new(Arc::new(Offline), Arc::new(PerMessage));
        let err = assembler
            .assemble(
                &ConversationId::new(),
                &[Message::user("hi")],
                &MessagePolicy::default(),
                &spec(100, 10),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[test]
    fn utilization_is_a_percentage() {
        let meta = AssemblyMetadata {
            available_tokens: 200,
            history_budget: 100,
            context_budget: 100,
            history_tokens: 40,
            context_tokens: 10,
            total_tokens: 50,
            history_included: 4,
            history_stored: 4,
            truncated: false,
        };
        assert!((meta.utilization_pct() - 25.0).abs() < f32::EPSILON);
    }
}
