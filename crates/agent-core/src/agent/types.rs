use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Continuation state of one conversation.
///
/// `continuation` is the provider-side thread handle; `None` means the next
/// request starts a fresh thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationState {
    pub id: String,
    pub continuation: Option<String>,
    pub model: String,
}

impl ConversationState {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            continuation: None,
            model: model.into(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.continuation.is_none()
    }

    pub fn reset(&mut self) {
        self.continuation = None;
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Adopt the handle produced by a completed turn.
    pub fn commit(&mut self, continuation: String) {
        self.continuation = Some(continuation);
    }
}

/// What a finished turn exposes to transcript writers and callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnSummary {
    pub text: String,
    pub tool_calls: usize,
    pub last_tool: Option<String>,
    pub last_tool_input_len: usize,
    pub last_tool_output_preview: Option<String>,
}

impl TurnSummary {
    pub fn used_tool(&self) -> bool {
        self.last_tool.is_some()
    }
}

/// Cut `text` to at most `max_chars` characters, never splitting a char.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
