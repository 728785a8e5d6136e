//! Adapter exposing a bridge-advertised tool through the [`Tool`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::Tool;
use crate::bridge::{McpBridge, ToolDescriptor};

/// Bridge handle shared by every tool discovered from it.
pub type SharedBridge = Arc<Mutex<McpBridge>>;

/// One MCP tool plus the bridge that serves it.
pub struct McpTool {
    descriptor: ToolDescriptor,
    description: String,
    bridge: SharedBridge,
}

impl McpTool {
    pub fn new(descriptor: ToolDescriptor, bridge: SharedBridge) -> Self {
        let description = descriptor.description.clone().unwrap_or_default();
        Self {
            descriptor,
            description,
            bridge,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.descriptor.input_schema.clone()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let args = match args {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        tracing::debug!(tool = %self.descriptor.name, "Calling MCP tool");
        let result = self
            .bridge
            .lock()
            .await
            .call_tool(&self.descriptor.name, args)
            .await?;

        let text = result.render_text();
        if result.is_error {
            anyhow::bail!(text);
        }
        Ok(text)
    }
}
