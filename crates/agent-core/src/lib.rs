pub mod agent;
pub mod tools;

pub use agent::{truncate_preview, AgentError, AgentEvent, ConversationState, TurnSummary};
pub use tools::{
    invoke_tool_call, parse_tool_args, CallKind, PendingToolCall, RegistryError, SharedTool, Tool,
    ToolCallAccumulator, ToolCallItem, ToolError, ToolFailure, ToolInput, ToolInvocation,
    ToolKind, ToolOutput, ToolRegistry, ToolSchema,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
