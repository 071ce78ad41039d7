pub mod accumulator;
pub mod executor;
pub mod registry;
pub mod types;

pub use accumulator::{PendingToolCall, ToolCallAccumulator};
pub use executor::{
    invoke_tool_call, parse_tool_args, ToolError, ToolFailure, ToolInvocation,
};
pub use registry::{RegistryError, SharedTool, Tool, ToolRegistry};
pub use types::{
    empty_object_schema, ensure_json_payload, CallKind, FunctionSchema, ToolCallItem, ToolInput,
    ToolKind, ToolOutput, ToolSchema,
};
