use std::sync::Arc;

use agent_core::tools::ToolRegistry;

/// Configuration for the agent loop.
pub struct AgentLoopConfig {
    /// Tool calls allowed in one turn before it is aborted.
    pub max_rounds: usize,
    /// Length, in chars, of the tool output preview kept in the turn summary.
    pub preview_chars: usize,
    pub instructions: Option<String>,
    pub tool_registry: Arc<ToolRegistry>,
}

impl AgentLoopConfig {
    pub fn with_registry(tool_registry: Arc<ToolRegistry>) -> Self {
        Self {
            tool_registry,
            ..Self::default()
        }
    }
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: 50,
            preview_chars: 500,
            instructions: None,
            tool_registry: Arc::new(ToolRegistry::new()),
        }
    }
}
