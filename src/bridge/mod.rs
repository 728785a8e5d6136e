//! Tool bridge: an MCP server subprocess spoken to over stdio.
//!
//! The bridge is launched once per session, asked for its tools, and shut
//! down when the session ends.

mod client;
pub mod protocol;

use std::time::Duration;

use thiserror::Error;

pub use client::McpBridge;
pub use protocol::{CallToolResult, ToolDescriptor};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to start tool bridge: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Tool bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool bridge sent malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tool bridge closed its output stream")]
    Closed,

    #[error("Tool bridge did not answer {method} within {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Tool bridge error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Tool bridge protocol error: {0}")]
    Protocol(String),
}
