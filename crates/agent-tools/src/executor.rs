use std::sync::Arc;

use agent_core::tools::{RegistryError, ToolRegistry};

use crate::sandbox::Sandbox;
use crate::tools::{CodeExecTool, CodeWriteTool, RunStepsTool, ScriptEvalTool};

/// List of all built-in tool names
pub const BUILTIN_TOOL_NAMES: [&str; 4] = ["code_exec", "code_write", "script_eval", "run_steps"];

/// Registers every built-in sandbox tool into `registry`, all sharing one sandbox.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    sandbox: Arc<Sandbox>,
) -> Result<(), RegistryError> {
    registry.register(CodeExecTool::new(Arc::clone(&sandbox)))?;
    registry.register(CodeWriteTool::new(Arc::clone(&sandbox)))?;
    registry.register(ScriptEvalTool::new(Arc::clone(&sandbox)))?;
    registry.register(RunStepsTool::new(sandbox))?;
    log::debug!("registered {} built-in tools", BUILTIN_TOOL_NAMES.len());
    Ok(())
}

/// A fresh registry holding only the built-in tools.
pub fn builtin_registry(sandbox: Arc<Sandbox>) -> Result<ToolRegistry, RegistryError> {
    let registry = ToolRegistry::new();
    register_builtin_tools(&registry, sandbox)?;
    Ok(registry)
}
