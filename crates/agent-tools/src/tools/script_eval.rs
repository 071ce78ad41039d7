use std::sync::Arc;

use agent_core::tools::{Tool, ToolError, ToolInput, ToolOutput};
use async_trait::async_trait;
use serde_json::json;

use super::args;
use crate::sandbox::script::ALLOWED_MODULES;
use crate::sandbox::Sandbox;

/// In-process evaluation of short, dependency-free scripts (Tier A).
pub struct ScriptEvalTool {
    sandbox: Arc<Sandbox>,
}

impl ScriptEvalTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ScriptEvalTool {
    fn name(&self) -> &str {
        "script_eval"
    }

    fn description(&self) -> &str {
        "Evaluate a short Rhai script in-process for quick calculations. Only the math, random and \
         statistics modules are available; use print() to produce output."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": format!(
                        "Rhai source. Importable modules: {}",
                        ALLOWED_MODULES.join(", ")
                    )
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let code = args::required_text(&input.as_value(), "code")?;

        let result = match self.sandbox.evaluate_script(&code).await {
            Ok(output) => json!({
                "exit_code": output.exit_code,
                "stdout": output.stdout,
            }),
            Err(err) => err.to_json(),
        };
        Ok(ToolOutput::Json(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;
    use tempfile::TempDir;

    fn tool(dir: &TempDir) -> ScriptEvalTool {
        let sandbox = Sandbox::new(SandboxConfig::default().with_root(dir.path())).unwrap();
        ScriptEvalTool::new(Arc::new(sandbox))
    }

    #[tokio::test]
    async fn evaluates_and_captures_print() {
        let dir = TempDir::new().unwrap();
        let out = tool(&dir)
            .execute(ToolInput::Structured(json!({"code": "print(math::gcd(12, 18));"})))
            .await
            .unwrap();
        assert_eq!(out, ToolOutput::Json(json!({"exit_code": 0, "stdout": "6"})));
    }

    #[tokio::test]
    async fn banned_import_is_policy_violation() {
        let dir = TempDir::new().unwrap();
        let out = tool(&dir)
            .execute(ToolInput::Structured(json!({"code": "import \"os\" as os;"})))
            .await
            .unwrap();
        let ToolOutput::Json(value) = out else {
            panic!("expected json");
        };
        assert_eq!(value["error"], "policy_violation");
    }
}
