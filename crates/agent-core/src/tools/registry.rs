use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;

use crate::tools::{
    empty_object_schema, FunctionSchema, ToolError, ToolInput, ToolKind, ToolOutput, ToolSchema,
};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    fn kind(&self) -> ToolKind {
        ToolKind::Structured
    }

    fn parameters_schema(&self) -> serde_json::Value {
        empty_object_schema()
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolOutput, ToolError>;

    fn to_schema(&self) -> ToolSchema {
        let parameters = match self.parameters_schema() {
            serde_json::Value::Object(map) if !map.is_empty() => serde_json::Value::Object(map),
            _ => empty_object_schema(),
        };

        ToolSchema {
            schema_type: "function".to_string(),
            function: FunctionSchema {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters,
            },
        }
    }
}

pub type SharedTool = Arc<dyn Tool>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool with name '{0}' already registered")]
    DuplicateTool(String),

    #[error("invalid tool: {0}")]
    InvalidTool(String),
}

/// Registered tool together with the schema captured when it was added.
struct CatalogEntry {
    tool: SharedTool,
    schema: ToolSchema,
}

/// Catalog of tools, write-once per name and safe for concurrent lookups.
///
/// Schemas are captured once at registration so the model-facing list stays
/// identical across passes even if a tool builds its schema dynamically.
#[derive(Default)]
pub struct ToolRegistry {
    entries: DashMap<String, CatalogEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&self, tool: T) -> Result<(), RegistryError>
    where
        T: Tool + 'static,
    {
        self.register_shared(Arc::new(tool))
    }

    pub fn register_shared(&self, tool: SharedTool) -> Result<(), RegistryError> {
        let key = catalog_key(tool.as_ref())?;
        let Entry::Vacant(slot) = self.entries.entry(key.clone()) else {
            return Err(RegistryError::DuplicateTool(key));
        };

        let schema = tool.to_schema();
        log::debug!("Registered {:?} tool '{}'", tool.kind(), key);
        slot.insert(CatalogEntry { tool, schema });
        Ok(())
    }

    /// Look up a tool by name. Absence is an ordinary outcome.
    pub fn get(&self, name: &str) -> Option<SharedTool> {
        self.entries.get(name).map(|found| Arc::clone(&found.tool))
    }

    /// Snapshot of every tool schema, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .entries
            .iter()
            .map(|found| found.schema.clone())
            .collect();
        schemas.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        schemas
    }

    pub fn list_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|found| found.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn catalog_key(tool: &dyn Tool) -> Result<String, RegistryError> {
    let name = tool.name().trim();
    if name.is_empty() {
        return Err(RegistryError::InvalidTool(
            "tool name cannot be empty".to_string(),
        ));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidTool(format!(
            "tool name '{name}' contains whitespace"
        )));
    }
    Ok(name.to_string())
}
