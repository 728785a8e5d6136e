//! Per-request session setup: launch the bridge, discover tools, build the
//! agent and run the round-robin session.
//!
//! Nothing here is shared across requests. Every run gets its own bridge
//! subprocess and model client, and both are released when the run ends.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::agent::{AgentMessage, AssistantAgent};
use crate::bridge::{BridgeError, McpBridge};
use crate::config::Config;
use crate::llm::{LlmClient, OpenAiClient};
use crate::team::{RoundRobinSession, TaskResult, TeamError, TextMentionTermination};
use crate::tools::{McpTool, SharedBridge, ToolRegistry};

/// Name of the single agent in every session.
pub const AGENT_NAME: &str = "notion_agent";

/// Separator between messages in a rendered transcript.
pub const TRANSCRIPT_SEPARATOR: &str = "\n\n\n";

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Team(#[from] TeamError),
}

impl RunError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bridge(BridgeError::Timeout { .. }) => "bridge_timeout",
            Self::Bridge(_) => "bridge",
            Self::Team(TeamError::Participant { .. }) => "model",
            Self::Team(TeamError::NoParticipants) => "session",
        }
    }
}

/// Runs one task end to end.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, task: &str) -> Result<TaskResult, RunError>;
}

/// Production runner backed by the Notion MCP bridge and the completion service.
pub struct NotionTaskRunner {
    config: Arc<Config>,
}

impl NotionTaskRunner {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Run a task, handing each message to `on_message` as it is produced.
    pub async fn run_stream<F>(&self, task: &str, on_message: F) -> Result<TaskResult, RunError>
    where
        F: FnMut(&AgentMessage) + Send,
    {
        let bridge: SharedBridge = Arc::new(Mutex::new(McpBridge::launch(&self.config.bridge).await?));

        let outcome = self.run_with_bridge(Arc::clone(&bridge), task, on_message).await;

        match Arc::try_unwrap(bridge) {
            Ok(bridge) => bridge.into_inner().shutdown().await,
            Err(_) => tracing::warn!("Tool bridge still referenced after session; it will be killed on drop"),
        }

        outcome
    }

    async fn run_with_bridge<F>(&self, bridge: SharedBridge, task: &str, on_message: F) -> Result<TaskResult, RunError>
    where
        F: FnMut(&AgentMessage) + Send,
    {
        let descriptors = bridge.lock().await.list_tools().await?;

        let mut tools = ToolRegistry::new();
        for descriptor in descriptors {
            tools.register(Arc::new(McpTool::new(descriptor, Arc::clone(&bridge))));
        }

        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
            self.config.api_key.clone(),
            self.config.api_base.clone(),
        ));
        let agent = AssistantAgent::new(
            AGENT_NAME,
            self.config.default_model.clone(),
            llm,
            tools,
            &self.config.stop_phrase,
        )
        .with_reflection(self.config.reflect_on_tool_use);

        let mut session = RoundRobinSession::new(
            vec![Box::new(agent)],
            self.config.max_turns,
            TextMentionTermination::new(self.config.stop_phrase.clone()),
        );

        Ok(session.run_stream(task, on_message).await?)
    }
}

#[async_trait]
impl TaskRunner for NotionTaskRunner {
    async fn run_task(&self, task: &str) -> Result<TaskResult, RunError> {
        self.run_stream(task, |_| {}).await
    }
}

/// Join every message's text into one blob, oldest first.
pub fn render_transcript(messages: &[AgentMessage]) -> String {
    messages
        .iter()
        .map(AgentMessage::to_text)
        .collect::<Vec<_>>()
        .join(TRANSCRIPT_SEPARATOR)
}
