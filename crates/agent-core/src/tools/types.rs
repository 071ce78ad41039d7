use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Model-facing description of a registered tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// How a tool wants its arguments delivered.
///
/// Both kinds are exposed to the model as JSON-argument functions; the kind
/// only decides how the invocation loop interprets the payload afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Structured,
    Freeform,
}

/// How the provider framed a call on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    #[default]
    FunctionCall,
    CustomToolCall,
}

impl CallKind {
    pub fn from_item_type(item_type: &str) -> Option<Self> {
        match item_type {
            "function_call" => Some(Self::FunctionCall),
            "custom_tool_call" => Some(Self::CustomToolCall),
            _ => None,
        }
    }
}

/// A tool-call item as reported by the provider, possibly incomplete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallItem {
    pub item_id: Option<String>,
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub kind: CallKind,
    pub arguments: Option<String>,
}

impl ToolCallItem {
    /// Whether `other` describes the same provider item as `self`.
    pub fn same_item(&self, other: &ToolCallItem) -> bool {
        if let (Some(left), Some(right)) = (&self.item_id, &other.item_id) {
            return left == right;
        }
        if let (Some(left), Some(right)) = (&self.call_id, &other.call_id) {
            return left == right;
        }
        self.name.is_some() && self.name == other.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Structured(Value),
    Freeform(String),
}

impl ToolInput {
    /// JSON view of the input, used when reporting what a failed call attempted.
    pub fn as_value(&self) -> Value {
        match self {
            ToolInput::Structured(value) => value.clone(),
            ToolInput::Freeform(raw) => Value::String(raw.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Json(Value),
    Text(String),
}

impl ToolOutput {
    /// Serialize the output into the JSON string fed back to the provider.
    pub fn to_payload(&self) -> String {
        match self {
            ToolOutput::Json(value) => value.to_string(),
            ToolOutput::Text(text) => ensure_json_payload(text),
        }
    }
}

/// Pass JSON text through untouched and wrap anything else as `{"stdout": text}`.
pub fn ensure_json_payload(text: &str) -> String {
    if serde_json::from_str::<Value>(text).is_ok() {
        text.to_string()
    } else {
        json!({ "stdout": text }).to_string()
    }
}

pub fn empty_object_schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}
