//! Model client trait: the abstraction over LLM backends.
//!
//! A [`ModelClient`] knows how to send a shaped [`ChatRequest`] to a model
//! and get a response back, either complete or as a stream of chunks. The
//! engine receives one by injection; there is no process-wide default.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// A provider-agnostic chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "gpt-3.5-turbo-16k")
    pub model: String,

    /// The assembled conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Number of choices to generate
    #[serde(default = "default_choices")]
    pub n: u32,

    /// End-user identifier forwarded to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Functions the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDefinition>,

    /// Function the model is forced to call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallTarget>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_choices() -> u32 {
    1
}

/// A function definition sent to the model so it can produce structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// The function name
    pub name: String,

    /// Description of what the function receives
    pub description: String,

    /// JSON Schema describing the function's parameters
    pub parameters: serde_json::Value,
}

/// Forces the model to call the named function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallTarget {
    pub name: String,
}

/// A function call produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON string
    pub arguments: String,
}

/// One generated alternative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    /// The generated message
    pub message: Message,

    /// Structured call, when the model answered through a function
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

/// A complete (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated choices, at least one on success
    pub choices: Vec<ChatChoice>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

impl ChatResponse {
    pub fn first_choice(&self) -> Result<&ChatChoice, ProviderError> {
        self.choices.first().ok_or(ProviderError::EmptyResponse)
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The core ModelClient trait.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the first choice
    /// as a single final chunk.
    async fn stream(
        &self,
        request: ChatRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        let response = self.complete(request).await?;
        let content = response.first_choice()?.message.content.clone();
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(content),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }
}
