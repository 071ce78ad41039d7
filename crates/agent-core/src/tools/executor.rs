use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::{json, Value};
use thiserror::Error;

use crate::tools::{PendingToolCall, ToolInput, ToolKind, ToolOutput, ToolRegistry};

#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

const RAW_ARGUMENT_EXCERPT: usize = 200;

/// A tool call that did not produce output. Reported to the model as JSON,
/// never raised past the invocation boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolFailure {
    NotRegistered {
        tool: String,
    },
    ArgumentParse {
        tool: String,
        message: String,
        raw: String,
    },
    Execution {
        tool: String,
        message: String,
        args_seen: Value,
    },
}

impl ToolFailure {
    pub fn to_json(&self) -> Value {
        match self {
            ToolFailure::NotRegistered { tool } => json!({
                "error": "tool not registered",
                "tool": tool,
            }),
            ToolFailure::ArgumentParse { tool, message, raw } => json!({
                "error": format!("args parse error: {message}"),
                "tool": tool,
                "raw": raw.chars().take(RAW_ARGUMENT_EXCERPT).collect::<String>(),
            }),
            ToolFailure::Execution {
                tool,
                message,
                args_seen,
            } => json!({
                "error": message,
                "tool": tool,
                "args_seen": args_seen,
            }),
        }
    }
}

/// Outcome of executing one pending call.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: std::result::Result<ToolOutput, ToolFailure>,
}

impl ToolInvocation {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// JSON string fed back to the provider under `call_id`.
    pub fn output_payload(&self) -> String {
        match &self.outcome {
            Ok(output) => output.to_payload(),
            Err(failure) => failure.to_json().to_string(),
        }
    }
}

/// Parse a structured argument buffer. An empty buffer means "no arguments".
pub fn parse_tool_args(arguments: &str) -> Result<Value> {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return Ok(json!({}));
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
        Err(error) => Err(ToolError::InvalidArguments(error.to_string())),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolve and run one pending call. Every failure mode, including a panic
/// in the tool body, comes back as a [`ToolFailure`].
pub async fn invoke_tool_call(registry: &ToolRegistry, call: &PendingToolCall) -> ToolInvocation {
    let outcome = run_tool(registry, call).await;

    if let Err(failure) = &outcome {
        log::warn!("tool '{}' failed: {}", call.name, failure.to_json());
    }

    ToolInvocation {
        call_id: call.call_id.clone(),
        tool_name: call.name.clone(),
        outcome,
    }
}

async fn run_tool(
    registry: &ToolRegistry,
    call: &PendingToolCall,
) -> std::result::Result<ToolOutput, ToolFailure> {
    let Some(tool) = registry.get(&call.name) else {
        return Err(ToolFailure::NotRegistered {
            tool: call.name.clone(),
        });
    };

    let input = match tool.kind() {
        ToolKind::Structured => match parse_tool_args(&call.raw_arguments) {
            Ok(args) => ToolInput::Structured(args),
            Err(error) => {
                return Err(ToolFailure::ArgumentParse {
                    tool: call.name.clone(),
                    message: match error {
                        ToolError::InvalidArguments(message) => message,
                        other => other.to_string(),
                    },
                    raw: call.raw_arguments.clone(),
                })
            }
        },
        ToolKind::Freeform => ToolInput::Freeform(call.raw_arguments.clone()),
    };

    let args_seen = input.as_value();
    let result = AssertUnwindSafe(tool.execute(input)).catch_unwind().await;

    match result {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(error)) => Err(ToolFailure::Execution {
            tool: call.name.clone(),
            message: error.to_string(),
            args_seen,
        }),
        Err(panic) => Err(ToolFailure::Execution {
            tool: call.name.clone(),
            message: format!("tool panicked: {}", panic_message(panic.as_ref())),
            args_seen,
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
