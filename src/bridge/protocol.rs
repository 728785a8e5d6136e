//! JSON-RPC 2.0 framing and the MCP payloads the bridge exchanges.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Outgoing request (or notification when `id` is absent).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn request(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: method.into(),
            params: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Anything the server writes on stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// What an incoming line turned out to be.
#[derive(Debug)]
pub enum Incoming {
    /// Reply to one of our requests
    Response {
        id: u64,
        result: Result<Value, JsonRpcError>,
    },
    /// Server-initiated request that needs an answer
    Request { id: Value, method: String },
    /// Server notification (logging, progress, list_changed, ...)
    Notification { method: String },
}

impl IncomingMessage {
    pub fn classify(self) -> Option<Incoming> {
        match (self.id, self.method) {
            (Some(id), Some(method)) => Some(Incoming::Request { id, method }),
            (None, Some(method)) => Some(Incoming::Notification { method }),
            (Some(id), None) => {
                let id = id.as_u64()?;
                let result = match self.error {
                    Some(err) => Err(err),
                    None => Ok(self.result.unwrap_or(Value::Null)),
                };
                Some(Incoming::Response { id, result })
            }
            (None, None) => None,
        }
    }
}

/// Reply we send to a server-initiated request.
#[derive(Debug, Serialize)]
pub struct JsonRpcReply {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcReply {
    pub fn for_request(id: Value, method: &str) -> Self {
        if method == "ping" {
            Self {
                jsonrpc: JSONRPC_VERSION,
                id,
                result: Some(Value::Object(Default::default())),
                error: None,
            }
        } else {
            Self {
                jsonrpc: JSONRPC_VERSION,
                id,
                result: None,
                error: Some(JsonRpcError {
                    code: METHOD_NOT_FOUND,
                    message: format!("Method not found: {}", method),
                    data: None,
                }),
            }
        }
    }
}

/// A tool advertised by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// One page of `tools/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Content block returned by `tools/call`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    Audio {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    ResourceLink {
        uri: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Flatten content blocks into the text the model sees.
    pub fn render_text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::Image { mime_type } => format!("[image: {}]", mime_type),
                ContentBlock::Audio { mime_type } => format!("[audio: {}]", mime_type),
                ContentBlock::Resource { resource } => resource.to_string(),
                ContentBlock::ResourceLink { uri } => format!("[resource: {}]", uri),
                ContentBlock::Unsupported => "[unsupported content]".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
