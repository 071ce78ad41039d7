use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_core::tools::{invoke_tool_call, ToolSchema};
use agent_core::{truncate_preview, AgentError, AgentEvent, ConversationState, TurnSummary};
use agent_llm::{LLMProvider, ResponseInput, ResponseRequest};

use crate::config::AgentLoopConfig;
use crate::stream::handler::{consume_response_stream, map_llm_error, PassOutcome};

pub type Result<T> = std::result::Result<T, AgentError>;

/// Everything one streaming pass needs besides its input and handle.
struct PassContext<'a> {
    llm: &'a dyn LLMProvider,
    model: &'a str,
    tool_schemas: &'a [ToolSchema],
    instructions: Option<&'a str>,
    event_tx: &'a mpsc::Sender<AgentEvent>,
    cancel_token: &'a CancellationToken,
    session_id: &'a str,
}

/// Run one user turn to completion: stream, invoke the requested tool, feed
/// its output back, and repeat until a pass requests no tool.
///
/// `state.continuation` is updated only when the turn succeeds.
pub async fn run_turn(
    state: &mut ConversationState,
    user_input: String,
    event_tx: mpsc::Sender<AgentEvent>,
    llm: Arc<dyn LLMProvider>,
    cancel_token: CancellationToken,
    config: &AgentLoopConfig,
) -> Result<TurnSummary> {
    let debug_logger = DebugLogger::new(log::log_enabled!(log::Level::Debug));
    let session_id = state.id.clone();
    let tool_schemas = config.tool_registry.list_tools();

    log::debug!("[{}] Starting turn with input: {}", session_id, user_input);
    debug_logger.log_event(
        &session_id,
        "turn_start",
        serde_json::json!({
            "model": state.model,
            "fresh_thread": state.is_fresh(),
            "tool_count": tool_schemas.len(),
            "max_rounds": config.max_rounds,
        }),
    );

    let ctx = PassContext {
        llm: llm.as_ref(),
        model: &state.model,
        tool_schemas: &tool_schemas,
        instructions: config.instructions.as_deref(),
        event_tx: &event_tx,
        cancel_token: &cancel_token,
        session_id: &session_id,
    };

    let mut continuation = state.continuation.clone();
    let mut input = ResponseInput::Text(user_input);
    let mut summary = TurnSummary::default();

    for pass_index in 1.. {
        if cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        debug_logger.log_event(
            &session_id,
            "pass_start",
            serde_json::json!({
                "pass": pass_index,
                "continuation": continuation,
                "tool_output": matches!(input, ResponseInput::ToolOutput { .. }),
            }),
        );

        let timer = Timer::new("response_pass");
        let pass = stream_with_reset(&ctx, &input, &mut continuation).await?;
        timer.debug(&session_id);

        if pass.ignored_calls > 0 {
            log::warn!(
                "[{}] Model requested {} extra tool call(s) in one pass; only the first runs",
                session_id,
                pass.ignored_calls
            );
        }

        continuation = Some(pass.continuation);
        summary.text.push_str(&pass.text);

        let Some(call) = pass.call else {
            break;
        };

        if summary.tool_calls >= config.max_rounds {
            log::warn!(
                "[{}] Tool round limit ({}) reached; aborting turn",
                session_id,
                config.max_rounds
            );
            let _ = event_tx
                .send(AgentEvent::Error {
                    message: format!("tool round limit of {} reached", config.max_rounds),
                })
                .await;
            return Err(AgentError::RoundLimit(config.max_rounds));
        }

        let _ = event_tx
            .send(AgentEvent::ToolStart {
                tool_call_id: call.call_id.clone(),
                tool_name: call.name.clone(),
                arguments: call.raw_arguments.clone(),
            })
            .await;
        debug_logger.log_event(
            &session_id,
            "tool_start",
            serde_json::json!({
                "call_id": call.call_id,
                "tool": call.name,
                "kind": call.kind,
                "input_bytes": call.raw_arguments.len(),
            }),
        );

        let invocation = invoke_tool_call(config.tool_registry.as_ref(), &call).await;
        let output = invocation.output_payload();
        let preview = truncate_preview(&output, config.preview_chars);

        let _ = event_tx
            .send(AgentEvent::ToolComplete {
                tool_call_id: call.call_id.clone(),
                tool_name: call.name.clone(),
                success: invocation.is_success(),
                output_preview: preview.clone(),
            })
            .await;
        debug_logger.log_event(
            &session_id,
            "tool_complete",
            serde_json::json!({
                "call_id": call.call_id,
                "tool": call.name,
                "success": invocation.is_success(),
                "output_bytes": output.len(),
            }),
        );

        summary.tool_calls += 1;
        summary.last_tool = Some(call.name.clone());
        summary.last_tool_input_len = call.raw_arguments.len();
        summary.last_tool_output_preview = Some(preview);

        input = ResponseInput::ToolOutput {
            call_id: call.call_id,
            output,
        };
    }

    if let Some(handle) = continuation {
        state.commit(handle);
    }

    let _ = event_tx
        .send(AgentEvent::Complete {
            tool_calls: summary.tool_calls,
        })
        .await;
    log::debug!(
        "[{}] Turn complete ({} tool call(s))",
        session_id,
        summary.tool_calls
    );

    Ok(summary)
}

/// Stream one pass. If the provider rejects the handle as stale, drop it and
/// retry the same input once on a fresh thread.
async fn stream_with_reset(
    ctx: &PassContext<'_>,
    input: &ResponseInput,
    continuation: &mut Option<String>,
) -> Result<PassOutcome> {
    let mut discarded = String::new();
    match stream_pass(ctx, input, continuation.clone(), &mut discarded).await {
        Err(AgentError::StaleContinuation(reason)) if continuation.is_some() => {
            log::warn!(
                "[{}] Continuation rejected ({}) after {} streamed byte(s); retrying on a fresh thread",
                ctx.session_id,
                reason,
                discarded.len()
            );
            let _ = ctx
                .event_tx
                .send(AgentEvent::ThreadReset {
                    reason: reason.clone(),
                    discarded,
                })
                .await;
            *continuation = None;

            let retried = stream_pass(ctx, input, None, &mut String::new()).await;
            if let Err(error @ AgentError::StaleContinuation(_)) = &retried {
                let _ = ctx
                    .event_tx
                    .send(AgentEvent::Error {
                        message: error.to_string(),
                    })
                    .await;
            }
            retried
        }
        other => other,
    }
}

async fn stream_pass(
    ctx: &PassContext<'_>,
    input: &ResponseInput,
    continuation: Option<String>,
    visible: &mut String,
) -> Result<PassOutcome> {
    let request = ResponseRequest::new(ctx.model, input.clone())
        .with_tools(ctx.tool_schemas.to_vec())
        .with_previous_response_id(continuation)
        .with_instructions(ctx.instructions.map(str::to_string));

    let stream = match ctx.llm.response_stream(&request).await {
        Ok(stream) => stream,
        Err(error) => {
            let error = map_llm_error(error);
            if !matches!(error, AgentError::StaleContinuation(_)) {
                let _ = ctx
                    .event_tx
                    .send(AgentEvent::Error {
                        message: error.to_string(),
                    })
                    .await;
            }
            return Err(error);
        }
    };

    consume_response_stream(
        stream,
        ctx.event_tx,
        ctx.cancel_token,
        ctx.session_id,
        visible,
    )
    .await
}

struct DebugLogger {
    enabled: bool,
}

impl DebugLogger {
    fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn log_event(&self, session_id: &str, event_type: &str, details: serde_json::Value) {
        if !self.enabled {
            return;
        }

        log::debug!("[{}] {}: {}", session_id, event_type, details);
    }
}

struct Timer {
    name: &'static str,
    start: std::time::Instant,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            start: std::time::Instant::now(),
        }
    }

    fn debug(&self, session_id: &str) {
        log::debug!(
            "[{}] {} completed in {}ms",
            session_id,
            self.name,
            self.start.elapsed().as_millis()
        );
    }
}
