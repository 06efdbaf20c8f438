//! # contextweave Engine
//!
//! Conversation context assembly on top of the traits in
//! `contextweave-core`:
//!
//! - [`ContextAssembler`] picks history and orders request messages within
//!   the model's token budget
//! - [`RequestShaper`] turns them into plain, function-calling, or streaming
//!   requests, and [`decode_structured`] reads structured replies back
//! - [`Engine`] ties assembly, the model client and memory together, and
//!   records each successful turn
//! - [`setup`] builds an [`Engine`] from an `EngineConfig`

pub mod assembler;
pub mod engine;
pub mod setup;
pub mod shaper;
pub mod stream;

pub use assembler::{AssembledContext, AssemblyMetadata, ContextAssembler};
pub use engine::Engine;
pub use setup::{SetupError, build_catalog, build_tokenizer, open_store};
pub use shaper::{
    Delivery, OutputShape, RequestShaper, SchemaDescriptor, StructuredOutput, decode_structured,
};
pub use stream::TurnStream;

#[cfg(test)]
pub(crate) mod test_helpers {
    use async_trait::async_trait;
    use contextweave_core::error::ProviderError;
    use contextweave_core::message::Message;
    use contextweave_core::provider::{
        ChatChoice, ChatRequest, ChatResponse, FunctionCall, ModelClient, StreamChunk,
    };
    use contextweave_core::tokenizer::Tokenizer;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Every message costs one token.
    pub struct PerMessage;

    impl Tokenizer for PerMessage {
        fn count(&self, messages: &[Message], _model: &str) -> usize {
            messages.len()
        }
    }

    type StreamScript = Vec<Result<StreamChunk, ProviderError>>;

    /// A model client that replays scripted responses and keeps every request.
    #[derive(Default)]
    pub struct ScriptedClient {
        replies: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
        streams: Mutex<VecDeque<StreamScript>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn then_reply(self, response: ChatResponse) -> Self {
            self.replies.lock().unwrap().push_back(Ok(response));
            self
        }

        pub fn then_fail(self, error: ProviderError) -> Self {
            self.replies.lock().unwrap().push_back(Err(error));
            self
        }

        pub fn then_stream(self, chunks: StreamScript) -> Self {
            self.streams.lock().unwrap().push_back(chunks);
            self
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::EmptyResponse))
        }

        async fn stream(
            &self,
            request: ChatRequest,
        ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let script = self
                .streams
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(ProviderError::EmptyResponse)?;
            let (tx, rx) = mpsc::channel(script.len().max(1));
            for item in script {
                let _ = tx.try_send(item);
            }
            Ok(rx)
        }
    }

    /// A response with one plain choice per text.
    pub fn reply(texts: &[&str]) -> ChatResponse {
        ChatResponse {
            choices: texts
                .iter()
                .map(|t| ChatChoice {
                    message: Message::assistant(*t),
                    function_call: None,
                })
                .collect(),
            usage: None,
            model: "scripted".into(),
        }
    }

    /// A response that answers through a function call.
    pub fn reply_with_call(name: &str, arguments: &str) -> ChatResponse {
        ChatResponse {
            choices: vec![ChatChoice {
                message: Message::assistant(""),
                function_call: Some(FunctionCall {
                    name: name.into(),
                    arguments: arguments.into(),
                }),
            }],
            usage: None,
            model: "scripted".into(),
        }
    }
}
