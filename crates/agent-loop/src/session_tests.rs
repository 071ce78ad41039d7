use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_core::tools::{CallKind, Tool, ToolCallItem, ToolError, ToolInput, ToolOutput, ToolRegistry};
use agent_core::{AgentError, AgentEvent};
use agent_llm::{
    FinalResponse, LLMError, LLMProvider, LLMStream, ResponseInput, ResponseRequest, StreamEvent,
};

use crate::config::AgentLoopConfig;
use crate::session::ConversationSession;

/// One scripted reply: either an error before streaming, or a list of events.
enum Reply {
    Fail(LLMError),
    Events(Vec<agent_llm::Result<StreamEvent>>),
}

/// Replays canned replies in order and records every request it receives.
#[derive(Default)]
struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ResponseRequest>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ResponseRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn response_stream(&self, request: &ResponseRequest) -> agent_llm::Result<LLMStream> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Events(events)) => Ok(Box::pin(stream::iter(events))),
            None => Err(LLMError::Api("script exhausted".to_string())),
        }
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the arguments back"
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::Json(json!({ "echo": input.as_value() })))
    }
}

fn text_reply(id: &str, text: &str) -> Reply {
    Reply::Events(vec![
        Ok(StreamEvent::TextDelta(text.to_string())),
        Ok(StreamEvent::Completed(FinalResponse {
            id: id.to_string(),
            output: vec![],
        })),
    ])
}

fn tool_reply(id: &str, call_id: &str, name: &str, arguments: &str) -> Reply {
    Reply::Events(vec![
        Ok(StreamEvent::ToolItemAnnounced(ToolCallItem {
            item_id: Some(format!("fc_{call_id}")),
            call_id: Some(call_id.to_string()),
            name: Some(name.to_string()),
            kind: CallKind::FunctionCall,
            arguments: None,
        })),
        Ok(StreamEvent::ArgumentFragment {
            item_id: Some(format!("fc_{call_id}")),
            delta: arguments.to_string(),
        }),
        Ok(StreamEvent::Completed(FinalResponse {
            id: id.to_string(),
            output: vec![],
        })),
    ])
}

fn session(provider: Arc<ScriptedProvider>) -> ConversationSession {
    let registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();
    ConversationSession::new(
        provider,
        "test-model",
        AgentLoopConfig::with_registry(Arc::new(registry)),
    )
}

async fn turn(
    session: &mut ConversationSession,
    input: &str,
) -> (Result<agent_core::TurnSummary, AgentError>, Vec<AgentEvent>) {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let result = session
        .run_turn(input, event_tx, CancellationToken::new())
        .await;

    let mut events = Vec::new();
    while let Some(event) = event_rx.recv().await {
        events.push(event);
    }
    (result, events)
}

fn tool_output(request: &ResponseRequest) -> (String, Value) {
    match &request.input {
        ResponseInput::ToolOutput { call_id, output } => {
            (call_id.clone(), serde_json::from_str(output).unwrap())
        }
        other => panic!("expected tool output input, got {other:?}"),
    }
}

#[tokio::test]
async fn text_only_turn_commits_continuation() {
    let provider = ScriptedProvider::new(vec![text_reply("resp_1", "Hi there")]);
    let mut session = session(provider.clone());

    let (result, events) = turn(&mut session, "hello").await;

    let summary = result.unwrap();
    assert_eq!(summary.text, "Hi there");
    assert!(!summary.used_tool());
    assert_eq!(session.continuation(), Some("resp_1"));
    assert_eq!(events.last(), Some(&AgentEvent::Complete { tool_calls: 0 }));

    let requests = provider.requests();
    assert_eq!(requests[0].input, ResponseInput::Text("hello".to_string()));
    assert_eq!(requests[0].previous_response_id, None);
    assert!(!requests[0].parallel_tool_calls);
    assert_eq!(requests[0].tools[0].function.name, "echo");
}

#[tokio::test]
async fn tool_chain_feeds_output_back_on_the_same_thread() {
    let provider = ScriptedProvider::new(vec![
        tool_reply("resp_1", "call_a", "echo", r#"{"n": 1}"#),
        tool_reply("resp_2", "call_b", "echo", r#"{"n": 2}"#),
        text_reply("resp_3", "done"),
    ]);
    let mut session = session(provider.clone());

    let (result, events) = turn(&mut session, "go").await;

    let summary = result.unwrap();
    assert_eq!(summary.text, "done");
    assert_eq!(summary.tool_calls, 2);
    assert_eq!(summary.last_tool.as_deref(), Some("echo"));
    assert_eq!(summary.last_tool_input_len, r#"{"n": 2}"#.len());
    assert_eq!(
        summary.last_tool_output_preview.as_deref(),
        Some(r#"{"echo":{"n":2}}"#)
    );
    assert_eq!(session.continuation(), Some("resp_3"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].previous_response_id.as_deref(), Some("resp_1"));
    assert_eq!(requests[2].previous_response_id.as_deref(), Some("resp_2"));
    assert_eq!(tool_output(&requests[1]), ("call_a".to_string(), json!({"echo": {"n": 1}})));
    assert_eq!(tool_output(&requests[2]).0, "call_b");

    let starts: Vec<&AgentEvent> = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolStart { .. }))
        .collect();
    assert_eq!(starts.len(), 2);
    assert_eq!(events.last(), Some(&AgentEvent::Complete { tool_calls: 2 }));
}

#[tokio::test]
async fn malformed_arguments_do_not_end_the_turn() {
    let provider = ScriptedProvider::new(vec![
        tool_reply("resp_1", "call_a", "echo", "{"),
        tool_reply("resp_2", "call_b", "echo", r#"{"ok": true}"#),
        text_reply("resp_3", "recovered"),
        text_reply("resp_4", "next turn"),
    ]);
    let mut session = session(provider.clone());

    let (result, events) = turn(&mut session, "go").await;
    assert_eq!(result.unwrap().text, "recovered");

    let (_, error) = tool_output(&provider.requests()[1]);
    assert_eq!(error["tool"], "echo");
    assert!(error["error"].as_str().unwrap().starts_with("args parse error"));
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::ToolComplete { success: false, .. }
    )));

    let (result, _) = turn(&mut session, "again").await;
    assert_eq!(result.unwrap().text, "next turn");
    assert_eq!(session.continuation(), Some("resp_4"));
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model() {
    let provider = ScriptedProvider::new(vec![
        tool_reply("resp_1", "call_a", "missing", "{}"),
        text_reply("resp_2", "sorry"),
    ]);
    let mut session = session(provider.clone());

    let (result, _) = turn(&mut session, "go").await;
    assert!(result.is_ok());

    let (_, output) = tool_output(&provider.requests()[1]);
    assert_eq!(output, json!({"error": "tool not registered", "tool": "missing"}));
}

#[tokio::test]
async fn stale_continuation_is_reset_and_retried_once() {
    let provider = ScriptedProvider::new(vec![
        text_reply("resp_1", "first"),
        Reply::Fail(LLMError::StaleContinuation("previous_response_not_found".to_string())),
        text_reply("resp_2", "fresh"),
    ]);
    let mut session = session(provider.clone());
    turn(&mut session, "one").await.0.unwrap();

    let (result, events) = turn(&mut session, "two").await;

    assert_eq!(result.unwrap().text, "fresh");
    assert_eq!(session.continuation(), Some("resp_2"));
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::ThreadReset { .. })));

    let requests = provider.requests();
    assert_eq!(requests[1].previous_response_id.as_deref(), Some("resp_1"));
    assert_eq!(requests[2].previous_response_id, None);
    assert_eq!(requests[2].input, ResponseInput::Text("two".to_string()));
}

#[tokio::test]
async fn second_stale_failure_propagates_and_keeps_old_handle() {
    let provider = ScriptedProvider::new(vec![
        text_reply("resp_1", "first"),
        Reply::Fail(LLMError::StaleContinuation("gone".to_string())),
        Reply::Fail(LLMError::StaleContinuation("still gone".to_string())),
    ]);
    let mut session = session(provider.clone());
    turn(&mut session, "one").await.0.unwrap();

    let (result, events) = turn(&mut session, "two").await;

    assert!(matches!(result, Err(AgentError::StaleContinuation(_))));
    assert_eq!(session.continuation(), Some("resp_1"));
    assert!(matches!(events.last(), Some(AgentEvent::Error { .. })));
    assert_eq!(provider.requests().len(), 3);
}

#[tokio::test]
async fn stale_error_mid_stream_is_also_retried() {
    let provider = ScriptedProvider::new(vec![
        text_reply("resp_1", "first"),
        Reply::Events(vec![Err(LLMError::StaleContinuation(
            "No tool output found for function call call_x".to_string(),
        ))]),
        text_reply("resp_2", "fresh"),
    ]);
    let mut session = session(provider.clone());
    turn(&mut session, "one").await.0.unwrap();

    let (result, _) = turn(&mut session, "two").await;

    assert_eq!(result.unwrap().text, "fresh");
}

#[tokio::test]
async fn partial_text_before_stale_error_is_withdrawn_on_reset() {
    let provider = ScriptedProvider::new(vec![
        text_reply("resp_1", "first"),
        Reply::Events(vec![
            Ok(StreamEvent::TextDelta("Hel".to_string())),
            Err(LLMError::StaleContinuation("previous_response_not_found".to_string())),
        ]),
        text_reply("resp_2", "Hello"),
    ]);
    let mut session = session(provider.clone());
    turn(&mut session, "one").await.0.unwrap();

    let (result, events) = turn(&mut session, "two").await;

    assert_eq!(result.unwrap().text, "Hello");

    let reset_at = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ThreadReset { .. }))
        .expect("thread reset event");
    match &events[reset_at] {
        AgentEvent::ThreadReset { discarded, .. } => assert_eq!(discarded, "Hel"),
        other => panic!("unexpected event {other:?}"),
    }

    let tokens = |slice: &[AgentEvent]| -> String {
        slice
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Token { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    };
    assert_eq!(tokens(&events[..reset_at]), "Hel");
    assert_eq!(tokens(&events[reset_at..]), "Hello");
}

#[tokio::test]
async fn round_limit_aborts_without_committing() {
    let provider = ScriptedProvider::new(vec![
        tool_reply("resp_1", "call_a", "echo", "{}"),
        tool_reply("resp_2", "call_b", "echo", "{}"),
        tool_reply("resp_3", "call_c", "echo", "{}"),
    ]);
    let registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();
    let config = AgentLoopConfig {
        max_rounds: 2,
        ..AgentLoopConfig::with_registry(Arc::new(registry))
    };
    let mut session = ConversationSession::new(provider, "test-model", config);

    let (result, _) = turn(&mut session, "loop").await;

    assert!(matches!(result, Err(AgentError::RoundLimit(2))));
    assert!(session.state().is_fresh());
}

#[tokio::test]
async fn unrelated_failure_leaves_session_usable() {
    let provider = ScriptedProvider::new(vec![
        text_reply("resp_1", "first"),
        Reply::Fail(LLMError::Api("server_error: boom".to_string())),
        text_reply("resp_2", "back"),
    ]);
    let mut session = session(provider.clone());
    turn(&mut session, "one").await.0.unwrap();

    let (result, _) = turn(&mut session, "two").await;
    assert!(matches!(result, Err(AgentError::LLM(_))));
    assert_eq!(session.continuation(), Some("resp_1"));

    let (result, _) = turn(&mut session, "three").await;
    assert_eq!(result.unwrap().text, "back");
    assert_eq!(
        provider.requests()[2].previous_response_id.as_deref(),
        Some("resp_1")
    );
}

#[tokio::test]
async fn reset_and_model_switch_apply_to_next_request() {
    let provider = ScriptedProvider::new(vec![
        text_reply("resp_1", "a"),
        text_reply("resp_2", "b"),
    ]);
    let mut session = session(provider.clone());
    turn(&mut session, "one").await.0.unwrap();

    session.reset();
    session.set_model("other-model");
    assert_eq!(session.model(), "other-model");
    assert_eq!(session.continuation(), None);

    turn(&mut session, "two").await.0.unwrap();

    let requests = provider.requests();
    assert_eq!(requests[1].model, "other-model");
    assert_eq!(requests[1].previous_response_id, None);
}

#[tokio::test]
async fn long_tool_output_preview_is_truncated() {
    let provider = ScriptedProvider::new(vec![
        tool_reply("resp_1", "call_a", "echo", &format!(r#"{{"s": "{}"}}"#, "é".repeat(800))),
        text_reply("resp_2", "ok"),
    ]);
    let mut session = session(provider);

    let summary = turn(&mut session, "go").await.0.unwrap();

    let preview = summary.last_tool_output_preview.unwrap();
    assert_eq!(preview.chars().count(), 500);
}

#[tokio::test]
async fn script_eval_tool_runs_inside_a_turn() {
    let dir = tempfile::TempDir::new().unwrap();
    let sandbox = agent_tools::Sandbox::new(
        agent_tools::SandboxConfig::default().with_root(dir.path()),
    )
    .unwrap();
    let registry = agent_tools::builtin_registry(Arc::new(sandbox)).unwrap();

    let provider = ScriptedProvider::new(vec![
        tool_reply("resp_1", "call_a", "script_eval", r#"{"code": "print(6 * 7);"}"#),
        text_reply("resp_2", "42"),
    ]);
    let mut session = ConversationSession::new(
        provider.clone(),
        "test-model",
        AgentLoopConfig::with_registry(Arc::new(registry)),
    );

    let summary = turn(&mut session, "compute").await.0.unwrap();

    assert_eq!(summary.last_tool.as_deref(), Some("script_eval"));
    let (_, output) = tool_output(&provider.requests()[1]);
    assert_eq!(output, json!({"exit_code": 0, "stdout": "42"}));
}
