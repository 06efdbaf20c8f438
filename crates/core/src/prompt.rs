//! Prompt construction and per-request settings.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// An ordered list of in-flight messages: the caller's new turn plus any
/// system instructions that go with it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Prompt {
    messages: Vec<Message>,
}

impl Prompt {
    /// A prompt made of a single user message.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text)],
        }
    }

    pub fn builder() -> PromptBuilder {
        PromptBuilder::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// The prompt's non-system messages, which are what gets stored as the
    /// user side of a turn.
    pub fn turn_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !m.is_system())
            .cloned()
            .collect()
    }
}

/// Fluent builder for [`Prompt`].
#[derive(Debug, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn system(self, text: impl Into<String>) -> Self {
        self.message(Message::system(text))
    }

    pub fn user(self, text: impl Into<String>) -> Self {
        self.message(Message::user(text))
    }

    pub fn assistant(self, text: impl Into<String>) -> Self {
        self.message(Message::assistant(text))
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Encode a structured value as the JSON content of a user message.
    pub fn user_json<T: Serialize>(self, value: &T) -> Result<Self, serde_json::Error> {
        let content = serde_json::to_string(value)?;
        Ok(self.message(Message::new(Role::User, content)))
    }

    /// Append messages numbered `1 - ...`, `2 - ...`, keeping their roles.
    pub fn steps(mut self, steps: impl IntoIterator<Item = Message>) -> Self {
        for (i, step) in steps.into_iter().enumerate() {
            let numbered = Message {
                content: format!("{} - {}", i + 1, step.content),
                ..step
            };
            self.messages.push(numbered);
        }
        self
    }

    pub fn build(self) -> Prompt {
        Prompt {
            messages: self.messages,
        }
    }
}

/// Settings applied to every request the engine issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_predictions")]
    pub number_of_predictions: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

fn default_temperature() -> f32 {
    0.4
}
fn default_predictions() -> u32 {
    1
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
            number_of_predictions: default_predictions(),
            user: None,
        }
    }
}
