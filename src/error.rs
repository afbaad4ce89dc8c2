//! Error types for ToolRelay
//!
//! One crate-wide error enum, mirroring the error taxonomy of the request
//! pipeline: transport (inbound), model (fatal to the request), tool
//! (recoverable, folded into the transcript), session, and the round budget.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RelayError>;

/// All errors produced by ToolRelay components.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration is missing or invalid (startup only).
    #[error("Config error: {0}")]
    Config(String),

    /// Inbound request was malformed; the agent loop never started.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The model call failed or returned an unparseable/invalid response.
    /// Fatal to the current request; the caller decides on retry policy.
    #[error("Model error: {0}")]
    Model(String),

    /// A tool invocation failed at the transport level. Usually folded into
    /// the transcript as a structured failure rather than surfaced.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session persistence failed.
    #[error("Session error: {0}")]
    Session(String),

    /// The agent loop hit its round budget without terminating. Distinct
    /// from a model error so runaway loops can be alerted on specifically.
    #[error("Round budget exceeded after {rounds} rounds")]
    RoundBudget { rounds: u32 },

    /// Outbound delivery failed.
    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
