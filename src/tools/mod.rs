//! Tool registry: the callable capabilities handed to the agent.
//!
//! Tools are discovered from the MCP bridge at session setup and live only as
//! long as the session that discovered them.

mod mcp;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolSchema;

pub use mcp::{McpTool, SharedBridge};

/// A capability the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. Errors are reported back to the model, not to the caller.
    async fn execute(&self, args: Value) -> anyhow::Result<String>;
}

/// Name and description, as listed to the model.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Tools available to one agent, kept in registration order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.by_name.get(&name) {
            Some(&index) => {
                tracing::warn!(tool = %name, "Duplicate tool name, replacing earlier definition");
                self.tools[index] = tool;
            }
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Function-calling schemas for every registered tool.
    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema::function(t.name(), t.description(), t.parameters_schema()))
            .collect()
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, args: Value) -> anyhow::Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("The tool '{}' is not available.", name))?;
        tool.execute(args).await
    }
}
