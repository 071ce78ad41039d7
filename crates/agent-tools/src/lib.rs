//! Built-in sandbox tools.
//!
//! The [`sandbox`] module executes untrusted code in two tiers: gated
//! in-process scripts and process/container runs confined to a sandbox root.
//! [`steps`] turns fenced code in model output into runnable steps. The
//! tools in [`tools`] expose both to the model through the `Tool` trait.

mod executor;
pub mod sandbox;
pub mod steps;
pub mod tools;

pub use executor::{builtin_registry, register_builtin_tools, BUILTIN_TOOL_NAMES};

pub use sandbox::{
    ExecutionOutput, Language, RuntimeKind, Sandbox, SandboxConfig, SandboxError, SandboxRequest,
};
pub use steps::{extract_steps, ExecutableStep, StepLanguage};
pub use tools::{CodeExecTool, CodeWriteTool, RunStepsTool, ScriptEvalTool, ToolRegistry};
