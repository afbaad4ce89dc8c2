//! Conversation message and session types.
//!
//! A message is a sum over the five transcript shapes rather than a
//! role-plus-optional-fields struct, so an assistant turn can carry text or
//! a tool call but never both, and a tool result always carries the id of
//! the call that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back on the result message.
    pub id: String,
    /// Meta-tool name, e.g. `REGISTRY_SEARCH_APPS`.
    pub name: String,
    /// Raw JSON argument string, exactly as the provider sent it. Parsed
    /// lazily at execution time so a malformed payload becomes a structured
    /// tool failure instead of a deserialization error.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the raw argument string into a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Tool` when the payload is not valid JSON or not
    /// an object.
    pub fn parse_arguments(&self) -> Result<Value> {
        let value: Value = serde_json::from_str(&self.arguments)
            .map_err(|e| RelayError::Tool(format!("arguments are not valid JSON: {e}")))?;
        if !value.is_object() {
            return Err(RelayError::Tool("arguments must be a JSON object".into()));
        }
        Ok(value)
    }
}

/// Transcript role, derived from the message shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One unit of conversational transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// System instruction.
    System { content: String },
    /// End-user text.
    User { content: String },
    /// Free-text assistant reply (terminal for a round).
    Assistant { content: String },
    /// Assistant turn requesting one tool invocation.
    ToolCall { call: ToolCall },
    /// Serialized tool outcome, linked to the call that produced it.
    ToolResult { call_id: String, content: String },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant { content: content.into() }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Message::ToolCall { call }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
        }
    }

    /// The wire role this message maps to.
    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } | Message::ToolCall { .. } => Role::Assistant,
            Message::ToolResult { .. } => Role::Tool,
        }
    }

    /// Text content, for the shapes that carry it.
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content }
            | Message::ToolResult { content, .. } => Some(content),
            Message::ToolCall { .. } => None,
        }
    }
}

/// A conversation session: one user/channel identity and its ordered
/// transcript. Insertion order is the conversation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Stable identity of the originating user/channel.
    pub key: String,
    /// Ordered transcript. Append-only during a single agent run.
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
