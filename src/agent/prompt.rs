//! System prompt for the Notion agent.

use crate::tools::ToolRegistry;

/// Build the system prompt. The stop phrase is only a convention the model is
/// asked to follow; nothing enforces it.
pub fn build_system_prompt(stop_phrase: &str, tools: &ToolRegistry) -> String {
    let tool_names = tools
        .list_tools()
        .iter()
        .map(|t| t.name.clone())
        .collect::<Vec<_>>()
        .join(", ");

    let tool_line = if tool_names.is_empty() {
        String::new()
    } else {
        format!("\nAvailable Notion tools: {tool_names}.")
    };

    format!(
        "You are a helpful assistant that can search and summarize content from the user's Notion workspace and also \
list what is asked. Try to assume the tool and call the same and get the answer.{tool_line} \
Say {stop_phrase} when you are done with the task."
    )
}
