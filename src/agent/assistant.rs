//! Single tool-calling assistant.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use crate::llm::{ChatMessage, ChatResponse, LlmClient, LlmError, ToolCall, ToolSchema};
use crate::team::Participant;
use crate::tools::ToolRegistry;

use super::message::{AgentMessage, MessageKind, ToolCallResult};
use super::prompt::build_system_prompt;

/// An LLM-backed agent with a fixed system prompt and a tool set.
///
/// Each turn makes one model call; if the model asks for tools they are run
/// concurrently and, with reflection enabled, a second tool-less call turns
/// the results into text.
pub struct AssistantAgent {
    name: String,
    model: String,
    system_prompt: String,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    reflect_on_tool_use: bool,
    context: Vec<ChatMessage>,
}

impl AssistantAgent {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        stop_phrase: &str,
    ) -> Self {
        let system_prompt = build_system_prompt(stop_phrase, &tools);
        Self {
            name: name.into(),
            model: model.into(),
            system_prompt,
            llm,
            tools,
            reflect_on_tool_use: true,
            context: Vec::new(),
        }
    }

    pub fn with_reflection(mut self, reflect_on_tool_use: bool) -> Self {
        self.reflect_on_tool_use = reflect_on_tool_use;
        self
    }

    /// Model context accumulated so far (system prompt excluded).
    pub fn context(&self) -> &[ChatMessage] {
        &self.context
    }

    async fn complete(&self, tools: Option<&[ToolSchema]>) -> Result<ChatResponse, LlmError> {
        let mut messages = Vec::with_capacity(self.context.len() + 1);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.context.iter().cloned());

        self.llm.chat_completion(&self.model, &messages, tools).await
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> ToolCallResult {
        let name = &call.function.name;
        tracing::debug!(tool = %name, args = %call.function.arguments, "Executing tool call");

        let outcome = match parse_arguments(&call.function.arguments) {
            Ok(args) => self.tools.execute(name, args).await,
            Err(e) => Err(anyhow::anyhow!("Invalid arguments for {}: {}", name, e)),
        };

        let (content, is_error) = match outcome {
            Ok(output) => (output, false),
            Err(e) => (format!("Error: {}", e), true),
        };
        tracing::debug!(
            tool = %name,
            is_error,
            result = %truncate_for_log(&content, 500),
            "Tool call finished"
        );

        ToolCallResult {
            call_id: call.id.clone(),
            name: name.clone(),
            content,
            is_error,
        }
    }
}

#[async_trait]
impl Participant for AssistantAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_messages(&mut self, new_messages: &[AgentMessage]) -> Result<Vec<AgentMessage>, LlmError> {
        for message in new_messages {
            if let Some(text) = message.chat_text() {
                self.context.push(ChatMessage::user(text));
            }
        }

        let schemas = self.tools.get_tool_schemas();
        let tools = (!schemas.is_empty()).then_some(schemas.as_slice());
        let response = self.complete(tools).await?;

        let calls = response.requested_calls().to_vec();
        if calls.is_empty() {
            let content = response.content.unwrap_or_default();
            self.context.push(ChatMessage::assistant(content.clone()));
            return Ok(vec![AgentMessage::text(&self.name, content)]);
        }

        let mut emitted = Vec::with_capacity(3);
        self.context
            .push(ChatMessage::assistant_tool_calls(response.content.clone(), calls.clone()));
        emitted.push(AgentMessage::new(
            &self.name,
            MessageKind::ToolCallRequest {
                calls: calls.clone(),
            },
        ));

        let results = join_all(calls.iter().map(|call| self.execute_tool_call(call))).await;
        for result in &results {
            self.context
                .push(ChatMessage::tool(result.call_id.clone(), result.content.clone()));
        }

        let summary = results
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        emitted.push(AgentMessage::new(
            &self.name,
            MessageKind::ToolCallExecution { results },
        ));

        if self.reflect_on_tool_use {
            let reflection = self.complete(None).await?;
            let content = reflection.content.unwrap_or_default();
            self.context.push(ChatMessage::assistant(content.clone()));
            emitted.push(AgentMessage::text(&self.name, content));
        } else {
            emitted.push(AgentMessage::new(
                &self.name,
                MessageKind::ToolCallSummary { content: summary },
            ));
        }

        Ok(emitted)
    }
}

fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... [truncated]", &s[..idx]),
        None => s.to_string(),
    }
}
