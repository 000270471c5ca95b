use serde::{Deserialize, Serialize};

use super::message::Message;

/// Fired once per newly created message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub subject_id: String,
    pub entry_id: String,
    pub message_id: String,
    pub message: Message,
}

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationResult {
    Success,
    /// Nothing to do: non-user message, missing entry, or no messages.
    Skipped { reason: String },
    Error { error: String },
}

impl InvocationResult {
    pub fn skipped(reason: impl Into<String>) -> Self {
        InvocationResult::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success)
    }
}
