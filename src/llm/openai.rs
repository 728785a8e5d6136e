//! OpenAI-compatible Chat Completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{ChatMessage, ChatResponse, LlmClient, LlmError, ToolCall, ToolSchema};

/// Client for `POST {api_base}/chat/completions`.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    api_base: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

fn build_request(model: &str, messages: &[ChatMessage], tools: Option<&[ToolSchema]>) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages,
    });

    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        body["tools"] = json!(tools);
        body["tool_choice"] = json!("auto");
    }

    body
}

fn parse_response(json: &Value) -> Result<ChatResponse, LlmError> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0]".to_string()))?;
    let message = &choice["message"];

    let content = message["content"].as_str().map(str::to_string);
    let finish_reason = choice["finish_reason"].as_str().map(str::to_string);

    let tool_calls = match message.get("tool_calls") {
        Some(Value::Array(calls)) if !calls.is_empty() => {
            let calls: Vec<ToolCall> = serde_json::from_value(Value::Array(calls.clone()))
                .map_err(|e| LlmError::InvalidResponse(format!("malformed tool_calls: {}", e)))?;
            Some(calls)
        }
        _ => None,
    };

    Ok(ChatResponse {
        content,
        tool_calls,
        finish_reason,
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ChatResponse, LlmError> {
        let body = build_request(model, messages, tools);
        tracing::debug!(model, messages = messages.len(), "Sending chat completion request");

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let json: Value = response.json().await?;
        let parsed = parse_response(&json)?;
        tracing::debug!(
            tool_calls = parsed.requested_calls().len(),
            finish_reason = parsed.finish_reason.as_deref().unwrap_or(""),
            "Chat completion received"
        );
        Ok(parsed)
    }
}
