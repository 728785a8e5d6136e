//! Agent module - the single Notion assistant.
//!
//! Each turn the agent:
//! 1. Appends unseen chat messages to its model context
//! 2. Calls the LLM with the system prompt and the available tools
//! 3. If the LLM requests tool calls, runs them and records the results
//! 4. Optionally reflects on the results with a second, tool-less call

mod assistant;
mod message;
mod prompt;

pub use assistant::AssistantAgent;
pub use message::{AgentMessage, MessageKind, ToolCallResult};
pub use prompt::build_system_prompt;
