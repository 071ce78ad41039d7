use std::sync::Arc;

use agent_core::tools::{Tool, ToolError, ToolInput, ToolKind, ToolOutput};
use async_trait::async_trait;
use serde_json::json;

use super::args;
use crate::sandbox::Sandbox;
use crate::steps::extract_steps;

/// Freeform tool: the model hands over prose with fenced code blocks, and
/// every extracted step is written and run as one bundle.
pub struct RunStepsTool {
    sandbox: Arc<Sandbox>,
}

impl RunStepsTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for RunStepsTool {
    fn name(&self) -> &str {
        "run_steps"
    }

    fn description(&self) -> &str {
        "Write and run a multi-file solution. Send markdown with fenced python or bash blocks; \
         say `save as <name>` to name a file and `run <name>` to execute it."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Freeform
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "Markdown containing the fenced code blocks"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let text = match input {
            ToolInput::Freeform(raw) => unwrap_payload(raw),
            ToolInput::Structured(value) => args::text(value.get("input"))
                .or_else(|| args::text(Some(&value)))
                .unwrap_or_default(),
        };

        let steps = extract_steps(&text);
        log::debug!("run_steps extracted {} step(s)", steps.len());

        let result = match self.sandbox.run_steps(&steps).await {
            Ok(output) => output.to_json(),
            Err(err) => err.to_json(),
        };
        Ok(ToolOutput::Json(result))
    }
}

/// Freeform payloads still arrive JSON-wrapped when the model ignores the
/// tool kind; unwrap `{"input": ...}` and bare JSON strings.
fn unwrap_payload(raw: String) -> String {
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::String(_))) => {
            args::text(value.get("input"))
                .or_else(|| value.as_str().map(str::to_string))
                .unwrap_or(raw)
        }
        _ => raw,
    }
}
