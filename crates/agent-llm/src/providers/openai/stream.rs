//! Responses API event decoding and error classification.

use serde_json::Value;

use crate::provider::{LLMError, Result};
use crate::types::{tool_call_item_from_json, FinalResponse, StreamEvent};

/// Event types that carry tool-call argument text. Older SDKs used the
/// dotted names.
const ARGUMENT_EVENTS: &[&str] = &[
    "response.function_call_arguments.delta",
    "response.custom_tool_call_input.delta",
    "response.function_call.arguments.delta",
    "response.function_call.delta",
    "response.tool_call.delta",
];

const STALE_CODES: &[&str] = &["previous_response_not_found"];

/// Decode one SSE payload. Unknown event types are skipped.
pub fn parse_responses_event(event_name: &str, data: &str) -> Result<Option<StreamEvent>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let payload: Value = serde_json::from_str(data)?;
    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(event_name);

    match event_type {
        "response.output_text.delta" => Ok(payload
            .get("delta")
            .and_then(Value::as_str)
            .filter(|delta| !delta.is_empty())
            .map(|delta| StreamEvent::TextDelta(delta.to_string()))),

        "response.output_item.added" | "response.output_item.done" => {
            let Some(item) = payload.get("item").and_then(tool_call_item_from_json) else {
                return Ok(None);
            };
            if event_type == "response.output_item.added" {
                Ok(Some(StreamEvent::ToolItemAnnounced(item)))
            } else {
                Ok(Some(StreamEvent::ToolItemDone(item)))
            }
        }

        kind if ARGUMENT_EVENTS.contains(&kind) => {
            let delta = match payload.get("delta") {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Object(map)) => map
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                _ => String::new(),
            };
            if delta.is_empty() {
                return Ok(None);
            }
            Ok(Some(StreamEvent::ArgumentFragment {
                item_id: payload
                    .get("item_id")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                delta,
            }))
        }

        "response.completed" | "response.incomplete" => {
            let response = payload.get("response").cloned().unwrap_or(Value::Null);
            let final_response: FinalResponse = serde_json::from_value(response)?;
            Ok(Some(StreamEvent::Completed(final_response)))
        }

        "error" => Err(classify_api_error(&payload)),

        "response.failed" => {
            let error = payload
                .get("response")
                .and_then(|response| response.get("error"))
                .cloned()
                .unwrap_or_else(|| payload.clone());
            Err(classify_api_error(&error))
        }

        _ => Ok(None),
    }
}

/// Map a provider error object onto [`LLMError`].
///
/// Accepts either `{"error": {...}}` or the bare error object. This is the
/// only place that decides whether a failure means the continuation handle
/// can no longer be resumed.
pub fn classify_api_error(body: &Value) -> LLMError {
    let error = body.get("error").filter(|e| e.is_object()).unwrap_or(body);

    let text = |field: &str| error.get(field).and_then(Value::as_str).unwrap_or_default();
    let code = text("code");
    let param = text("param");
    let message = text("message");

    let stale = STALE_CODES.contains(&code)
        || (param == "previous_response_id" && !code.is_empty())
        || message.starts_with("No tool output found for function call");

    let detail = if message.is_empty() {
        error.to_string()
    } else if code.is_empty() {
        message.to_string()
    } else {
        format!("{code}: {message}")
    };

    if stale {
        LLMError::StaleContinuation(detail)
    } else {
        LLMError::Api(detail)
    }
}
