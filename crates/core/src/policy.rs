//! Message selection policy.
//!
//! A [`MessagePolicy`] splits a model's available token space into two
//! independent allowances: one for stored history and one for the
//! in-flight prompt. The two percentages are not slices of a shared 100;
//! their sum may exceed 100.

use crate::error::PolicyError;
use serde::{Deserialize, Serialize};

/// How much of the available token space history and context may use.
///
/// Only constructible through validation, so every instance in the system
/// is well-formed. Deserialization goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMessagePolicy", into = "RawMessagePolicy")]
pub struct MessagePolicy {
    history_percent: u32,
    history_padding_tokens: u32,
    context_percent: u32,
}

#[derive(Serialize, Deserialize)]
struct RawMessagePolicy {
    #[serde(default = "default_percent")]
    history_percent: i64,
    #[serde(default = "default_padding")]
    history_padding_tokens: i64,
    #[serde(default = "default_percent")]
    context_percent: i64,
}

fn default_percent() -> i64 {
    50
}
fn default_padding() -> i64 {
    100
}

impl MessagePolicy {
    /// Validate and build a policy.
    pub fn new(
        history_percent: i64,
        history_padding_tokens: i64,
        context_percent: i64,
    ) -> Result<Self, PolicyError> {
        let history_percent = percent("history_percent", history_percent)?;
        let context_percent = percent("context_percent", context_percent)?;
        if history_padding_tokens < 0 {
            return Err(PolicyError::Negative {
                field: "history_padding_tokens",
                value: history_padding_tokens,
            });
        }
        let history_padding_tokens =
            u32::try_from(history_padding_tokens).map_err(|_| PolicyError::TooLarge {
                field: "history_padding_tokens",
                value: history_padding_tokens,
                max: u32::MAX,
            })?;

        Ok(Self {
            history_percent,
            history_padding_tokens,
            context_percent,
        })
    }

    pub fn history_percent(&self) -> u32 {
        self.history_percent
    }

    pub fn history_padding_tokens(&self) -> u32 {
        self.history_padding_tokens
    }

    pub fn context_percent(&self) -> u32 {
        self.context_percent
    }

    /// `floor(available * history_percent / 100) + history_padding_tokens`
    pub fn history_budget(&self, available_tokens: usize) -> usize {
        fraction(available_tokens, self.history_percent)
            .saturating_add(self.history_padding_tokens as usize)
    }

    /// `floor(available * context_percent / 100)`
    pub fn context_budget(&self, available_tokens: usize) -> usize {
        fraction(available_tokens, self.context_percent)
    }
}

impl Default for MessagePolicy {
    fn default() -> Self {
        Self {
            history_percent: 50,
            history_padding_tokens: 100,
            context_percent: 50,
        }
    }
}

impl TryFrom<RawMessagePolicy> for MessagePolicy {
    type Error = PolicyError;

    fn try_from(raw: RawMessagePolicy) -> Result<Self, Self::Error> {
        Self::new(
            raw.history_percent,
            raw.history_padding_tokens,
            raw.context_percent,
        )
    }
}

impl From<MessagePolicy> for RawMessagePolicy {
    fn from(policy: MessagePolicy) -> Self {
        Self {
            history_percent: policy.history_percent.into(),
            history_padding_tokens: policy.history_padding_tokens.into(),
            context_percent: policy.context_percent.into(),
        }
    }
}

fn percent(field: &'static str, value: i64) -> Result<u32, PolicyError> {
    if value < 0 {
        return Err(PolicyError::Negative { field, value });
    }
    if value > 100 {
        return Err(PolicyError::PercentOutOfRange { field, value });
    }
    Ok(value as u32)
}

fn fraction(available_tokens: usize, percent: u32) -> usize {
    ((available_tokens as u128 * percent as u128) / 100) as usize
}
