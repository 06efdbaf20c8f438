//! Request shaping: turn assembled messages into a provider request.
//!
//! The caller picks the [`OutputShape`]; the model's [`ModelKind`] decides
//! whether a structured shape travels as a forced function call or only as
//! a decoding expectation on the reply content. Plain-chat models never see
//! function descriptors.

use contextweave_core::error::ResponseDecodeError;
use contextweave_core::message::Message;
use contextweave_core::model::{ModelKind, ModelSpec};
use contextweave_core::prompt::PromptConfig;
use contextweave_core::provider::{
    ChatChoice, ChatRequest, FunctionCallTarget, FunctionDefinition,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JSON schema of a structured reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Function name presented to the model
    pub name: String,
    pub description: String,
    /// JSON Schema object
    pub parameters: serde_json::Value,
}

impl SchemaDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    fn to_function(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// What the caller expects back.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputShape {
    RawText,
    Structured(SchemaDescriptor),
}

/// A reply type the engine can request and decode.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Answer { answer: String }
///
/// impl StructuredOutput for Answer {
///     fn schema() -> SchemaDescriptor {
///         SchemaDescriptor::new("answer", "The answer", json!({
///             "type": "object",
///             "properties": { "answer": { "type": "string" } },
///             "required": ["answer"]
///         }))
///     }
/// }
/// ```
pub trait StructuredOutput: Serialize + DeserializeOwned {
    fn schema() -> SchemaDescriptor;
}

/// Whether the reply arrives in one piece or as increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    #[default]
    Complete,
    Streaming,
}

/// Builds [`ChatRequest`]s. Stateless.
pub struct RequestShaper;

impl RequestShaper {
    pub fn shape(
        model: &ModelSpec,
        messages: Vec<Message>,
        output: &OutputShape,
        config: &PromptConfig,
        delivery: Delivery,
    ) -> ChatRequest {
        let (functions, function_call) = match (output, model.kind) {
            (OutputShape::Structured(schema), ModelKind::FunctionCalling) => (
                vec![schema.to_function()],
                Some(FunctionCallTarget {
                    name: schema.name.clone(),
                }),
            ),
            _ => (Vec::new(), None),
        };

        ChatRequest {
            model: model.name.clone(),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            n: config.number_of_predictions.max(1),
            user: config.user.clone(),
            functions,
            function_call,
            stream: delivery == Delivery::Streaming,
        }
    }
}

/// Decode a structured reply from a choice.
///
/// Reads the function-call arguments when present, otherwise the message
/// content. Content that wraps a JSON object in prose or a code fence is
/// decoded from its outermost `{...}` span.
pub fn decode_structured<T: DeserializeOwned>(choice: &ChatChoice) -> Result<T, ResponseDecodeError> {
    let raw = match &choice.function_call {
        Some(call) => call.arguments.as_str(),
        None => choice.message.content.as_str(),
    };
    decode_json(raw)
}

fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, ResponseDecodeError> {
    let first_err = match serde_json::from_str(raw.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str(&raw[start..=end])
    {
        return Ok(value);
    }

    Err(ResponseDecodeError {
        reason: first_err.to_string(),
        raw: raw.to_string(),
    })
}
