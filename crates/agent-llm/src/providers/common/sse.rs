//! Shared SSE -> [`LLMStream`] adapter.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Response;

use crate::provider::{LLMError, LLMStream, Result};
use crate::types::StreamEvent;

/// Provider-reported failures keep their variant so callers can match on
/// them; transport and decode failures collapse into `LLMError::Stream`.
fn to_stream_error(err: LLMError) -> LLMError {
    match err {
        err @ (LLMError::Stream(_)
        | LLMError::StaleContinuation(_)
        | LLMError::Api(_)
        | LLMError::Auth(_)) => err,
        other => LLMError::Stream(other.to_string()),
    }
}

/// Frames that carry no event: keep-alive blanks and the `[DONE]` sentinel
/// some Responses-compatible servers append after `response.completed`.
fn is_control_frame(data: &str) -> bool {
    let data = data.trim();
    data.is_empty() || data == "[DONE]"
}

/// Convert an SSE HTTP [`Response`] into an [`LLMStream`].
///
/// Control frames are dropped before `handler` runs. `handler` receives the SSE event name and data payload for each event, and can either:
/// - return `Ok(Some(event))` to emit an event
/// - return `Ok(None)` to skip an event
/// - return `Err(_)` to emit a stream error
pub fn llm_stream_from_sse<H>(response: Response, mut handler: H) -> LLMStream
where
    H: FnMut(&str, &str) -> Result<Option<StreamEvent>> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(move |event| {
            let event = event.map_err(|e| LLMError::Stream(e.to_string()))?;
            if is_control_frame(&event.data) {
                return Ok(None);
            }
            handler(event.event.as_str(), event.data.as_str()).map_err(to_stream_error)
        })
        .filter_map(|result| async move {
            match result {
                Ok(Some(event)) => Some(Ok(event)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            }
        });

    Box::pin(stream)
}
