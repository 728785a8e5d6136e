//! API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::AgentMessage;
use crate::runner::render_transcript;
use crate::team::TaskResult;

/// Body of `POST /run`.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// The task description. Kept loose so a wrong type reads as "missing".
    pub task: Value,
}

impl RunRequest {
    /// Parse a request body. Anything but a JSON object is rejected.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let mut fields: Map<String, Value> = serde_json::from_slice(body)?;
        Ok(Self {
            task: fields.remove("task").unwrap_or(Value::Null),
        })
    }

    /// The task, if present as a non-empty string.
    pub fn task(&self) -> Option<&str> {
        self.task.as_str().filter(|t| !t.is_empty())
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// Response of `POST /run`.
#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub status: RunStatus,

    /// Transcript on success, error text on failure
    pub result: String,

    /// Why the session ended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Structured copy of the transcript
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<AgentMessage>>,
}

impl RunResponse {
    pub fn success(result: TaskResult) -> Self {
        Self {
            status: RunStatus::Success,
            result: render_transcript(&result.messages),
            stop_reason: Some(result.stop_reason.to_string()),
            messages: Some(result.messages),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            result: message.into(),
            stop_reason: None,
            messages: None,
        }
    }
}

/// Client error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `GET /` body.
#[derive(Debug, Clone, Serialize)]
pub struct RootResponse {
    pub message: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Liveness message
    pub message: String,

    /// Service version
    pub version: String,
}
