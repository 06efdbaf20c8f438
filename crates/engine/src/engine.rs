//! The engine facade: assemble, issue, record.
//!
//! Every prompt helper follows the same flow:
//!
//! 1. Resolve the model through the [`ModelCatalog`]. `None` means the
//!    engine's default model.
//! 2. Assemble history and the new prompt with the [`ContextAssembler`]
//! 3. Shape and send the request through the injected [`ModelClient`]
//! 4. On success, append the prompt's turn messages and the reply to
//!    memory in one atomic append. On any failure, append nothing.

use crate::assembler::{AssembledContext, ContextAssembler};
use crate::shaper::{Delivery, OutputShape, RequestShaper, StructuredOutput, decode_structured};
use crate::stream::TurnStream;
use contextweave_core::error::{Error, ProviderError, Result};
use contextweave_core::memory::{MemoryRecord, MemoryStore, RetrievalMode};
use contextweave_core::message::{ConversationId, Message};
use contextweave_core::model::{ModelCatalog, ModelSpec};
use contextweave_core::policy::MessagePolicy;
use contextweave_core::prompt::{Prompt, PromptConfig};
use contextweave_core::provider::{ChatRequest, ModelClient};
use contextweave_core::tokenizer::Tokenizer;
use std::sync::Arc;
use tracing::{debug, info};

/// Conversation engine over injected collaborators.
pub struct Engine {
    store: Arc<dyn MemoryStore>,
    catalog: Arc<dyn ModelCatalog>,
    client: Arc<dyn ModelClient>,
    assembler: ContextAssembler,
    policy: MessagePolicy,
    prompt_config: PromptConfig,
    default_model: Option<String>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        tokenizer: Arc<dyn Tokenizer>,
        catalog: Arc<dyn ModelCatalog>,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            assembler: ContextAssembler::new(store.clone(), tokenizer),
            store,
            catalog,
            client,
            policy: MessagePolicy::default(),
            prompt_config: PromptConfig::default(),
            default_model: None,
        }
    }

    /// Set the policy used by the prompt helpers.
    pub fn with_policy(mut self, policy: MessagePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_prompt_config(mut self, config: PromptConfig) -> Self {
        self.prompt_config = config;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalMode) -> Self {
        self.assembler = self.assembler.with_retrieval(retrieval);
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn policy(&self) -> &MessagePolicy {
        &self.policy
    }

    pub fn prompt_config(&self) -> &PromptConfig {
        &self.prompt_config
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Look up a model in the catalog, falling back to the default model
    /// when `model` is `None`.
    pub fn resolve_model(&self, model: Option<&str>) -> Result<ModelSpec> {
        let name = model
            .or(self.default_model.as_deref())
            .ok_or_else(|| Error::UnknownModel("no model named and no default set".into()))?;
        self.catalog
            .lookup(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    /// Assemble the request messages for `new_prompt` without sending them.
    pub async fn assemble(
        &self,
        conversation_id: &ConversationId,
        new_prompt: &[Message],
        policy: &MessagePolicy,
        model: &ModelSpec,
    ) -> Result<AssembledContext> {
        self.assembler
            .assemble(conversation_id, new_prompt, policy, model)
            .await
    }

    /// Atomically append a user message and the assistant's reply.
    pub async fn record_turn(
        &self,
        conversation_id: &ConversationId,
        user: Message,
        assistant: Message,
    ) -> Result<Vec<MemoryRecord>> {
        self.record(conversation_id, vec![user], assistant).await
    }

    /// Send `prompt` and return the first choice's text.
    pub async fn prompt_message(
        &self,
        conversation_id: &ConversationId,
        model: Option<&str>,
        prompt: &Prompt,
    ) -> Result<String> {
        self.prompt_messages(conversation_id, model, prompt)
            .await?
            .into_iter()
            .next()
            .ok_or(Error::Provider(ProviderError::EmptyResponse))
    }

    /// Send `prompt` and return the text of every choice.
    ///
    /// Only the first choice is recorded as the assistant's reply.
    pub async fn prompt_messages(
        &self,
        conversation_id: &ConversationId,
        model: Option<&str>,
        prompt: &Prompt,
    ) -> Result<Vec<String>> {
        let spec = self.resolve_model(model)?;
        let request = self
            .prepare(conversation_id, &spec, prompt, &OutputShape::RawText, Delivery::Complete)
            .await?;

        let response = self.client.complete(request).await?;
        let reply = response.first_choice()?.message.clone();
        let texts: Vec<String> = response
            .choices
            .into_iter()
            .map(|choice| choice.message.content)
            .collect();

        self.record(conversation_id, prompt.turn_messages(), reply)
            .await?;
        Ok(texts)
    }

    /// Send `prompt` and decode the reply as `T`.
    ///
    /// Function-calling models are forced to answer through `T`'s schema;
    /// plain-chat models are expected to answer with JSON content.
    pub async fn prompt<T: StructuredOutput>(
        &self,
        conversation_id: &ConversationId,
        model: Option<&str>,
        prompt: &Prompt,
    ) -> Result<T> {
        let spec = self.resolve_model(model)?;
        let output = OutputShape::Structured(T::schema());
        let request = self
            .prepare(conversation_id, &spec, prompt, &output, Delivery::Complete)
            .await?;

        let response = self.client.complete(request).await?;
        let choice = response.first_choice()?;
        let value: T = decode_structured(choice)?;

        let payload = match &choice.function_call {
            Some(call) => call.arguments.clone(),
            None => choice.message.content.clone(),
        };
        self.record(conversation_id, prompt.turn_messages(), Message::assistant(payload))
            .await?;
        Ok(value)
    }

    /// Send `prompt` and stream the reply.
    ///
    /// Nothing is recorded until the returned stream is drained.
    pub async fn prompt_streaming(
        &self,
        conversation_id: &ConversationId,
        model: Option<&str>,
        prompt: &Prompt,
    ) -> Result<TurnStream> {
        let spec = self.resolve_model(model)?;
        let request = self
            .prepare(conversation_id, &spec, prompt, &OutputShape::RawText, Delivery::Streaming)
            .await?;

        let receiver = self.client.stream(request).await?;
        Ok(TurnStream::new(
            receiver,
            self.store.clone(),
            conversation_id.clone(),
            prompt.turn_messages(),
        ))
    }

    /// Delete the conversation's stored history.
    pub async fn purge(&self, conversation_id: &ConversationId) -> Result<usize> {
        let removed = self.store.purge(conversation_id).await?;
        info!(conversation = %conversation_id, removed, "Purged conversation");
        Ok(removed)
    }

    async fn prepare(
        &self,
        conversation_id: &ConversationId,
        spec: &ModelSpec,
        prompt: &Prompt,
        output: &OutputShape,
        delivery: Delivery,
    ) -> Result<ChatRequest> {
        let context = self
            .assembler
            .assemble(conversation_id, prompt.messages(), &self.policy, spec)
            .await?;
        debug!(
            conversation = %conversation_id,
            model = %spec.name,
            messages = context.messages.len(),
            tokens = context.metadata.total_tokens,
            truncated = context.metadata.truncated,
            "Issuing request"
        );
        Ok(RequestShaper::shape(
            spec,
            context.messages,
            output,
            &self.prompt_config,
            delivery,
        ))
    }

    async fn record(
        &self,
        conversation_id: &ConversationId,
        mut turn: Vec<Message>,
        reply: Message,
    ) -> Result<Vec<MemoryRecord>> {
        turn.push(reply);
        let records = self.store.append_all(conversation_id, turn).await?;
        debug!(conversation = %conversation_id, recorded = records.len(), "Recorded turn");
        Ok(records)
    }
}
