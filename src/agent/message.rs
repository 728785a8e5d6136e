//! Messages emitted during a session.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::llm::ToolCall;

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

/// What a message carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    /// Natural-language text from the user or an agent
    Text { content: String },
    /// Tool invocations requested by the model
    ToolCallRequest { calls: Vec<ToolCall> },
    /// Results of those invocations
    ToolCallExecution { results: Vec<ToolCallResult> },
    /// Tool results passed through as the turn's answer (no reflection)
    ToolCallSummary { content: String },
}

/// One entry in the session transcript.
#[derive(Debug, Clone, Serialize)]
pub struct AgentMessage {
    pub source: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl AgentMessage {
    pub fn new(source: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            source: source.into(),
            created_at: Utc::now(),
            kind,
        }
    }

    pub fn text(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            source,
            MessageKind::Text {
                content: content.into(),
            },
        )
    }

    /// Conversation text: user or agent text and tool-call summaries.
    /// Tool call request/execution entries are events and carry none.
    pub fn chat_text(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Text { content } | MessageKind::ToolCallSummary { content } => Some(content),
            _ => None,
        }
    }

    /// Human-readable rendering used in the transcript.
    pub fn to_text(&self) -> String {
        match &self.kind {
            MessageKind::Text { content } | MessageKind::ToolCallSummary { content } => content.clone(),
            MessageKind::ToolCallRequest { calls } => calls
                .iter()
                .map(|c| format!("[tool call] {}({})", c.function.name, c.function.arguments))
                .collect::<Vec<_>>()
                .join("\n"),
            MessageKind::ToolCallExecution { results } => results
                .iter()
                .map(|r| {
                    let marker = if r.is_error { "tool error" } else { "tool result" };
                    format!("[{}] {}: {}", marker, r.name, r.content)
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl std::fmt::Display for AgentMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}
