//! Provider module - language model boundary
//!
//! A `ModelClient` is handed the ordered transcript and the declared tool
//! schemas and returns one turn: free-text content, exactly one tool call,
//! or neither. A turn carrying both violates the single-tool-call contract
//! and is rejected as a model error before the agent loop acts on it.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{RelayError, Result};
use crate::session::{Message, ToolCall};

/// One raw model response, before the exclusivity check.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTurn {
    /// Free-text content, if any.
    pub content: Option<String>,
    /// The first (and only permitted) requested tool call, if any.
    pub tool_call: Option<ToolCall>,
}

/// The action the agent loop takes for one round.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAction {
    /// Terminal free-text reply.
    Reply(String),
    /// Execute one tool and continue.
    Invoke(ToolCall),
    /// Neither content nor tool call: the model considers the task done.
    Done,
}

impl ModelTurn {
    /// Enforce the content-XOR-tool-call invariant.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Model` when the turn carries both content and a
    /// tool call. The loop never guesses precedence.
    pub fn into_action(self) -> Result<ModelAction> {
        match (self.content, self.tool_call) {
            (Some(content), None) => Ok(ModelAction::Reply(content)),
            (None, Some(call)) => Ok(ModelAction::Invoke(call)),
            (None, None) => Ok(ModelAction::Done),
            (Some(_), Some(call)) => Err(RelayError::Model(format!(
                "model returned both content and a tool call ({})",
                call.name
            ))),
        }
    }
}

/// Chat-completion boundary for the agent loop.
///
/// Implementations are stateless and re-entrant from the loop's point of
/// view; one call maps to one upstream model invocation with parallel tool
/// calls disabled.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the full ordered transcript plus declared tool schemas and
    /// return the model's turn.
    ///
    /// # Errors
    ///
    /// Upstream failures and unparseable responses surface as
    /// `RelayError::Model`; they are fatal to the current request and are
    /// not retried here.
    async fn chat(&self, messages: &[Message], tools: &[Value]) -> Result<ModelTurn>;
}
