use agent_core::tools::{CallKind, ToolCallItem, ToolSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One provider event, already decoded from the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    ToolItemAnnounced(ToolCallItem),
    ToolItemDone(ToolCallItem),
    ArgumentFragment {
        item_id: Option<String>,
        delta: String,
    },
    Completed(FinalResponse),
}

/// The finalized response object delivered with the completion event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub id: String,
    #[serde(default)]
    pub output: Vec<Value>,
}

impl FinalResponse {
    /// First tool-call item in the finalized output, if any.
    pub fn first_tool_call(&self) -> Option<ToolCallItem> {
        self.output.iter().find_map(tool_call_item_from_json)
    }
}

/// Decode a `function_call` / `custom_tool_call` output item.
pub fn tool_call_item_from_json(item: &Value) -> Option<ToolCallItem> {
    let kind = CallKind::from_item_type(item.get("type")?.as_str()?)?;

    let raw_arguments = item
        .get("arguments")
        .filter(|value| !value.is_null())
        .or_else(|| item.get("input"));

    let arguments = match raw_arguments {
        Some(Value::String(text)) => Some(text.clone()),
        Some(value @ (Value::Object(_) | Value::Array(_))) => Some(value.to_string()),
        _ => None,
    }
    .filter(|text| !text.trim().is_empty());

    let field = |name: &str| {
        item.get(name)
            .and_then(Value::as_str)
            .map(ToString::to_string)
    };

    Some(ToolCallItem {
        item_id: field("id"),
        call_id: field("call_id"),
        name: field("name"),
        kind,
        arguments,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseInput {
    Text(String),
    ToolOutput { call_id: String, output: String },
}

impl ResponseInput {
    pub fn to_json(&self) -> Value {
        match self {
            ResponseInput::Text(text) => Value::String(text.clone()),
            ResponseInput::ToolOutput { call_id, output } => serde_json::json!([{
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseRequest {
    pub model: String,
    pub input: ResponseInput,
    pub tools: Vec<ToolSchema>,
    pub previous_response_id: Option<String>,
    pub instructions: Option<String>,
    pub parallel_tool_calls: bool,
}

impl ResponseRequest {
    pub fn new(model: impl Into<String>, input: ResponseInput) -> Self {
        Self {
            model: model.into(),
            input,
            tools: Vec::new(),
            previous_response_id: None,
            instructions: None,
            parallel_tool_calls: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_previous_response_id(mut self, id: Option<String>) -> Self {
        self.previous_response_id = id;
        self
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }
}
