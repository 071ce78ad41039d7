use std::sync::Arc;

use agent_core::tools::{Tool, ToolError, ToolInput, ToolOutput};
use async_trait::async_trait;
use serde_json::json;

use super::args;
use crate::sandbox::{Language, Sandbox, SandboxRequest, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};

/// Runs Python in the sandbox (Tier B).
pub struct CodeExecTool {
    sandbox: Arc<Sandbox>,
}

impl CodeExecTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CodeExecTool {
    fn name(&self) -> &str {
        "code_exec"
    }

    fn description(&self) -> &str {
        "Execute Python code in an isolated sandbox directory and return exit code, stdout and stderr. \
         Files written by the code persist in the sandbox."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python source to run"
                },
                "language": {
                    "type": "string",
                    "enum": ["python"],
                    "description": "Only python is supported"
                },
                "args": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Command-line arguments passed to the script"
                },
                "stdin": {
                    "type": "string",
                    "description": "Text piped to standard input"
                },
                "filename": {
                    "type": "string",
                    "description": "Keep the code in this file (relative to cwd); .py is appended when missing"
                },
                "timeout": {
                    "type": "integer",
                    "minimum": MIN_TIMEOUT_SECS,
                    "maximum": MAX_TIMEOUT_SECS,
                    "description": "Wall-clock limit in seconds"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory relative to the sandbox root"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let args = input.as_value();

        let language_tag = args::optional_str(&args, "language").unwrap_or_else(|| "python".into());
        let Some(language) = Language::parse(&language_tag) else {
            return Ok(ToolOutput::Json(json!({
                "error": format!("Unsupported language '{language_tag}'. Only 'python' is supported."),
                "supported": ["python"],
            })));
        };

        let code = args::text(args.get("code")).unwrap_or_default();
        if code.trim().is_empty() {
            return Ok(ToolOutput::Json(json!({ "error": "Empty code provided." })));
        }

        let request = SandboxRequest {
            code,
            language,
            args: args::string_list(args.get("args"))?,
            stdin: args::text(args.get("stdin")),
            filename: args::optional_str(&args, "filename"),
            timeout_secs: args::u64_or(
                args.get("timeout"),
                self.sandbox.config().default_timeout_secs,
            )?,
            working_dir: args::optional_str(&args, "cwd"),
        };

        let root = self.sandbox.root().path();
        let result = match self.sandbox.execute(&request).await {
            Ok(output) => output.to_json(root),
            Err(err) => {
                log::warn!("code_exec failed: {}", err);
                let mut json = err.to_json();
                json["sandbox_root"] = json!(root.display().to_string());
                json
            }
        };

        Ok(ToolOutput::Json(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;
    use tempfile::TempDir;

    fn tool(dir: &TempDir) -> CodeExecTool {
        let sandbox = Sandbox::new(SandboxConfig::default().with_root(dir.path())).unwrap();
        CodeExecTool::new(Arc::new(sandbox))
    }

    async fn run(tool: &CodeExecTool, args: serde_json::Value) -> serde_json::Value {
        match tool.execute(ToolInput::Structured(args)).await.unwrap() {
            ToolOutput::Json(value) => value,
            ToolOutput::Text(text) => panic!("unexpected text output: {text}"),
        }
    }

    #[tokio::test]
    async fn unsupported_language_lists_supported() {
        let dir = TempDir::new().unwrap();
        let out = run(&tool(&dir), json!({"code": "puts 1", "language": "ruby"})).await;
        assert_eq!(out["supported"], json!(["python"]));
        assert!(out["error"].as_str().unwrap().contains("ruby"));
    }

    #[tokio::test]
    async fn empty_code_is_reported() {
        let dir = TempDir::new().unwrap();
        let out = run(&tool(&dir), json!({"code": "   "})).await;
        assert_eq!(out["error"], "Empty code provided.");
    }

    #[tokio::test]
    async fn out_of_range_timeout_is_an_error_payload() {
        let dir = TempDir::new().unwrap();
        let out = run(&tool(&dir), json!({"code": "print(1)", "timeout": 500})).await;
        assert_eq!(out["error"], "other");
        assert!(out["message"].as_str().unwrap().contains("between 1 and 120"));
    }

    #[tokio::test]
    async fn escaping_cwd_is_a_policy_violation() {
        let dir = TempDir::new().unwrap();
        let out = run(&tool(&dir), json!({"code": "print(1)", "cwd": "../.."})).await;
        assert_eq!(out["error"], "policy_violation");
        assert!(out.get("sandbox_root").is_some());
    }

    #[tokio::test]
    async fn runs_python_when_available() {
        let dir = TempDir::new().unwrap();
        let out = run(
            &tool(&dir),
            json!({"code": "import sys\nprint(sys.argv[1], input())", "args": "hello", "stdin": "world\n", "filename": "greet"}),
        )
        .await;

        if out["error"] == "runtime_unavailable" {
            return;
        }
        assert_eq!(out["exit_code"], 0);
        assert_eq!(out["stdout"], "hello world\n");
        assert_eq!(out["file"], "greet.py");
        assert!(dir.path().join("greet.py").exists());
    }
}
