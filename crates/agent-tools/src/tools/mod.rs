pub(crate) mod args;
pub mod code_exec;
pub mod code_write;
pub mod run_steps;
pub mod script_eval;

pub use code_exec::CodeExecTool;
pub use code_write::CodeWriteTool;
pub use run_steps::RunStepsTool;
pub use script_eval::ScriptEvalTool;

pub use agent_core::tools::ToolRegistry;
