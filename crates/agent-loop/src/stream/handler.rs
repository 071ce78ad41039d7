use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_core::tools::{PendingToolCall, ToolCallAccumulator};
use agent_core::{AgentError, AgentEvent};
use agent_llm::{FinalResponse, LLMError, LLMStream, StreamEvent};

/// Narration the model sometimes emits when routing to a tool.
const TOOL_ROUTING_MARKER: &str = "to=functions.";

/// Result of one streaming pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassOutcome {
    /// Visible text streamed before any tool narration.
    pub text: String,
    /// Handle of the finalized response; the next pass continues from it.
    pub continuation: String,
    pub call: Option<PendingToolCall>,
    pub ignored_calls: usize,
}

pub fn map_llm_error(error: LLMError) -> AgentError {
    match error {
        LLMError::StaleContinuation(message) => AgentError::StaleContinuation(message),
        other => AgentError::LLM(other.to_string()),
    }
}

/// Drive one pass to completion. Every token sent as `AgentEvent::Token` is
/// also appended to `visible`, so a caller abandoning the pass knows what the
/// consumer has already shown.
pub async fn consume_response_stream(
    mut stream: LLMStream,
    event_tx: &mpsc::Sender<AgentEvent>,
    cancel_token: &CancellationToken,
    session_id: &str,
    visible: &mut String,
) -> Result<PassOutcome, AgentError> {
    let mut suppress_text = false;
    let mut calls = ToolCallAccumulator::new();
    let mut completed: Option<FinalResponse> = None;

    while let Some(event) = stream.next().await {
        if cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        match event {
            Ok(StreamEvent::TextDelta(delta)) => {
                if suppress_text {
                    continue;
                }
                if delta.contains(TOOL_ROUTING_MARKER) {
                    log::debug!("[{}] Tool routing narration detected", session_id);
                    suppress_text = true;
                    continue;
                }
                visible.push_str(&delta);
                let _ = event_tx.send(AgentEvent::Token { content: delta }).await;
            }
            Ok(StreamEvent::ToolItemAnnounced(item)) | Ok(StreamEvent::ToolItemDone(item)) => {
                suppress_text = true;
                if !calls.announce(item) {
                    log::debug!(
                        "[{}] Ignoring additional tool item; one call is honored per pass",
                        session_id
                    );
                }
            }
            Ok(StreamEvent::ArgumentFragment { item_id, delta }) => {
                suppress_text = true;
                calls.push_fragment(item_id.as_deref(), &delta);
            }
            Ok(StreamEvent::Completed(response)) => {
                log::debug!("[{}] Response {} completed", session_id, response.id);
                completed = Some(response);
            }
            Err(error) => {
                let error = map_llm_error(error);
                if !matches!(error, AgentError::StaleContinuation(_)) {
                    let _ = event_tx
                        .send(AgentEvent::Error {
                            message: format!("Stream error: {error}"),
                        })
                        .await;
                }
                return Err(error);
            }
        }
    }

    if cancel_token.is_cancelled() {
        return Err(AgentError::Cancelled);
    }

    let Some(response) = completed else {
        let message = "stream ended without a completed response".to_string();
        let _ = event_tx
            .send(AgentEvent::Error {
                message: message.clone(),
            })
            .await;
        return Err(AgentError::LLM(message));
    };

    let ignored_calls = calls.ignored_calls();
    if calls.dropped_fragments() > 0 {
        log::debug!(
            "[{}] Dropped {} argument fragment(s) from ignored tool items",
            session_id,
            calls.dropped_fragments()
        );
    }

    let call = calls.finish(|| response.first_tool_call()).map(|mut call| {
        call.raw_arguments = call.raw_arguments.trim().to_string();
        call
    });

    Ok(PassOutcome {
        text: visible.clone(),
        continuation: response.id,
        call,
        ignored_calls,
    })
}
