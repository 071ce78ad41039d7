use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Token {
        content: String,
    },

    ToolStart {
        tool_call_id: String,
        tool_name: String,
        arguments: String,
    },

    ToolComplete {
        tool_call_id: String,
        tool_name: String,
        success: bool,
        output_preview: String,
    },

    /// The provider rejected the continuation handle and the turn restarted
    /// on a fresh thread. `discarded` is the text already streamed by the
    /// abandoned pass; the retry streams its reply from the start, so
    /// consumers drop this text instead of keeping both copies.
    ThreadReset {
        reason: String,
        discarded: String,
    },

    Complete {
        tool_calls: usize,
    },

    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = AgentEvent::ThreadReset {
            reason: "stale".to_string(),
            discarded: "partial".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "thread_reset");
        assert_eq!(json["reason"], "stale");
        assert_eq!(json["discarded"], "partial");
    }
}
