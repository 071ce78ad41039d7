use std::sync::Arc;

use agent_core::tools::{Tool, ToolError, ToolInput, ToolOutput};
use async_trait::async_trait;
use serde_json::json;

use super::args;
use crate::sandbox::Sandbox;

/// Tool for writing files inside the sandbox
pub struct CodeWriteTool {
    sandbox: Arc<Sandbox>,
}

impl CodeWriteTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CodeWriteTool {
    fn name(&self) -> &str {
        "code_write"
    }

    fn description(&self) -> &str {
        "Write a text file inside the sandbox so later code_exec calls can use it"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to cwd"
                },
                "content": {
                    "type": "string",
                    "description": "File contents"
                },
                "cwd": {
                    "type": "string",
                    "description": "Directory relative to the sandbox root"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let args = input.as_value();
        let path = args::optional_str(&args, "path")
            .ok_or_else(|| ToolError::InvalidArguments("missing 'path' parameter".to_string()))?;
        let content = args::required_text(&args, "content")?;
        let cwd = args::optional_str(&args, "cwd");

        match self.sandbox.write_file(&path, &content, cwd.as_deref()).await {
            Ok((target, workdir)) => {
                let root = self.sandbox.root();
                Ok(ToolOutput::Json(json!({
                    "status": "ok",
                    "path": root.relative(&target),
                    "cwd": root.relative(&workdir),
                })))
            }
            Err(err) => Ok(ToolOutput::Json(err.to_json())),
        }
    }
}
