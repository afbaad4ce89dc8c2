//! The agent tool-calling loop.
//!
//! One run drives repeated model invocations interleaved with tool
//! execution until a terminal condition: a free-text reply, a turn with
//! neither content nor tool call, or the round budget. Tool failures are
//! folded into the transcript so the model can recover; model failures and
//! the round budget abort the run.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::media::{extract_inline_image, InlineImage};
use crate::provider::{ModelAction, ModelClient};
use crate::session::Message;
use crate::tools::{meta_schemas, CallerIdentity, ToolInvoker, ToolOutcome};

use super::context::ContextBuilder;

/// Result of one completed agent run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The model's final free-text reply, or the last serialized tool
    /// outcome when the model stopped without one.
    pub reply: Option<String>,
    /// The input history plus every envelope appended during the run.
    pub history: Vec<Message>,
    /// Rounds consumed.
    pub rounds: u32,
    /// Inline image extracted from a tool payload, if any (last one wins).
    pub media: Option<InlineImage>,
}

/// Orchestrates model and tool calls for one conversation turn.
pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolInvoker>,
    context: ContextBuilder,
    identity: CallerIdentity,
    max_rounds: u32,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolInvoker>,
        context: ContextBuilder,
        identity: CallerIdentity,
        max_rounds: u32,
    ) -> Self {
        debug_assert!(max_rounds > 0);
        Self {
            model,
            tools,
            context,
            identity,
            max_rounds,
        }
    }

    /// Run the loop for one inbound user message.
    ///
    /// `history` is the session transcript loaded by the caller; the run
    /// appends one `Assistant` envelope per terminating round and a
    /// `ToolCall`/`ToolResult` pair per tool round. The caller owns
    /// persistence; nothing is saved here.
    ///
    /// # Errors
    ///
    /// - `RelayError::Model` when the model call fails, its response is
    ///   unparseable, or it returns content and a tool call together.
    /// - `RelayError::RoundBudget` when `max_rounds` rounds pass without a
    ///   terminal response.
    pub async fn run(&self, user_text: &str, mut history: Vec<Message>) -> Result<RunOutcome> {
        let mut tentative_reply: Option<String> = None;
        let mut media: Option<InlineImage> = None;

        for round in 1..=self.max_rounds {
            let context = self.context.build(user_text, &history);
            debug!(round, context_len = context.len(), "awaiting model");

            let turn = self.model.chat(&context, &meta_schemas()).await?;
            match turn.into_action()? {
                ModelAction::Reply(content) => {
                    info!(round, "model replied with content");
                    history.push(Message::assistant(&content));
                    return Ok(RunOutcome {
                        reply: Some(content),
                        history,
                        rounds: round,
                        media,
                    });
                }
                ModelAction::Invoke(call) => {
                    info!(round, tool = %call.name, call_id = %call.id, "model requested tool");
                    history.push(Message::tool_call(call.clone()));

                    let outcome = self.invoke(&call).await;
                    if let ToolOutcome::Success { data } = &outcome {
                        if let Some(image) = extract_inline_image(data) {
                            media = Some(image);
                        }
                    }
                    // The raw outcome, failures included, is the tentative
                    // result until a later round overwrites it.
                    tentative_reply = Some(outcome.to_transcript());
                    history.push(Message::tool_result(&call.id, outcome.to_transcript()));
                }
                ModelAction::Done => {
                    info!(round, "model returned neither content nor tool call");
                    return Ok(RunOutcome {
                        reply: tentative_reply,
                        history,
                        rounds: round,
                        media,
                    });
                }
            }
        }

        warn!(max_rounds = self.max_rounds, "round budget exhausted");
        Err(RelayError::RoundBudget {
            rounds: self.max_rounds,
        })
    }

    /// Execute one tool call, folding every failure mode into a structured
    /// outcome: malformed argument JSON, invoker transport errors, and
    /// registry-side failures all come back as `ToolOutcome::Failure`.
    async fn invoke(&self, call: &crate::session::ToolCall) -> ToolOutcome {
        let arguments = match call.parse_arguments() {
            Ok(v) => v,
            Err(e) => return ToolOutcome::failure("invalid_arguments", e.to_string()),
        };

        match self
            .tools
            .execute(&call.name, arguments, &self.identity)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool invoker failed");
                ToolOutcome::failure("invoker_error", e.to_string())
            }
        }
    }
}
