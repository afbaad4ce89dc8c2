//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::error::{RelayError, Result};
use crate::session::{Message, ToolCall};

use super::{ModelClient, ModelTurn};

/// Chat completions client for OpenAI-compatible endpoints.
///
/// Every request pins `parallel_tool_calls: false`; the transcript stays
/// strictly linear and the loop only ever sees the first tool call.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RelayError::Model(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Convert one transcript message into the chat-completions wire shape.
    fn wire_message(message: &Message) -> Value {
        match message {
            Message::System { content } => json!({"role": "system", "content": content}),
            Message::User { content } => json!({"role": "user", "content": content}),
            Message::Assistant { content } => json!({"role": "assistant", "content": content}),
            Message::ToolCall { call } => json!({
                "role": "assistant",
                "tool_calls": [{
                    "id": call.id,
                    "type": "function",
                    "function": {"name": call.name, "arguments": call.arguments},
                }],
            }),
            Message::ToolResult { call_id, content } => json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": content,
            }),
        }
    }

    fn parse_turn(data: &Value) -> Result<ModelTurn> {
        let message = data["choices"]
            .get(0)
            .map(|choice| &choice["message"])
            .ok_or_else(|| RelayError::Model("no choices in response".into()))?;

        let content = message["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let tool_call = message["tool_calls"]
            .as_array()
            .and_then(|calls| calls.first())
            .map(|tc| {
                // Some compatible endpoints omit the call id; synthesize one
                // so the tool-result back-reference stays unique.
                let id = tc["id"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4()));
                ToolCall::new(
                    id,
                    tc["function"]["name"].as_str().unwrap_or_default(),
                    tc["function"]["arguments"].as_str().unwrap_or("{}"),
                )
            });

        Ok(ModelTurn { content, tool_call })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn chat(&self, messages: &[Message], tools: &[Value]) -> Result<ModelTurn> {
        let wire_messages: Vec<Value> = messages.iter().map(Self::wire_message).collect();

        let mut body = json!({
            "model": self.model,
            "messages": wire_messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["parallel_tool_calls"] = json!(false);
        }

        let url = format!("{}/chat/completions", self.base_url);
        info!(model = %self.model, tools = tools.len(), messages = messages.len(), "calling model");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Model(format!("model request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::Model(format!("model response read failed: {e}")))?;

        if !status.is_success() {
            error!(status = %status, "model API error: {}", text);
            return Err(RelayError::Model(format!("model API returned {status}")));
        }

        // Truncate for debug logging, respecting UTF-8 char boundaries.
        let truncated = if text.len() > 2000 {
            let mut end = 2000;
            while end > 0 && !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        } else {
            &text
        };
        debug!("model response: {}", truncated);

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| RelayError::Model(format!("unparseable model response: {e}")))?;
        Self::parse_turn(&data)
    }
}
