//! Tools module - dynamic tool-discovery boundary
//!
//! The model never sees the registry's open-ended catalog directly. It is
//! declared exactly four meta-tools and reaches everything else through
//! them:
//!
//! 1. `REGISTRY_SEARCH_APPS` - find relevant app providers by query
//! 2. `REGISTRY_SEARCH_FUNCTIONS` - find functions, optionally scoped to apps
//! 3. `REGISTRY_GET_FUNCTION_DEFINITION` - fetch one function's schema
//! 4. `REGISTRY_EXECUTE_FUNCTION` - execute one function with arguments
//!
//! Executions are scoped to an authenticated account identity and an
//! explicit app allow-list. Failures are structured values, never silent
//! no-ops, so the agent loop can fold them into the transcript and let the
//! model recover.

mod registry;

pub use registry::RegistryClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;

/// Meta-tool names declared to the model.
pub const SEARCH_APPS: &str = "REGISTRY_SEARCH_APPS";
pub const SEARCH_FUNCTIONS: &str = "REGISTRY_SEARCH_FUNCTIONS";
pub const GET_FUNCTION_DEFINITION: &str = "REGISTRY_GET_FUNCTION_DEFINITION";
pub const EXECUTE_FUNCTION: &str = "REGISTRY_EXECUTE_FUNCTION";

/// The account/tenant identity and provider scoping a tool execution
/// runs under.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    /// Authenticated account the execution is attributed to.
    pub account_id: String,
    /// Explicit allow-list of app providers. Empty defers to the
    /// registry's own default scoping for the account.
    pub allowed_apps: Vec<String>,
}

/// Structured result of one tool invocation. Always serializable to text
/// for insertion into a tool-result transcript message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { data: Value },
    Failure { kind: String, message: String },
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        ToolOutcome::Success { data }
    }

    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// Serialize for the transcript. Falls back to a plain-text rendering
    /// if JSON serialization of the payload itself fails.
    pub fn to_transcript(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!("{{\"status\":\"failure\",\"kind\":\"serialization\",\"message\":\"{e}\"}}")
        })
    }
}

/// Execution boundary for the dynamic tool registry.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Execute one meta-tool with pre-parsed arguments.
    ///
    /// Unresolvable names and schema mismatches come back as
    /// `ToolOutcome::Failure`; only transport-level problems surface as
    /// `Err`, and the agent loop folds those into the transcript too.
    async fn execute(
        &self,
        name: &str,
        arguments: Value,
        identity: &CallerIdentity,
    ) -> Result<ToolOutcome>;
}

/// OpenAI function schemas for the four meta-tools, declared on every
/// model round.
pub fn meta_schemas() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": SEARCH_APPS,
                "description": "Search for app providers relevant to a task. Each app groups a set of callable functions.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Free-text description of the task or capability"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of apps to return"
                        }
                    },
                    "required": ["query"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": SEARCH_FUNCTIONS,
                "description": "Search for callable functions by free-text query, optionally restricted to specific apps.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Free-text description of the function needed"
                        },
                        "app_names": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Restrict the search to these apps"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of functions to return"
                        }
                    },
                    "required": ["query"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": GET_FUNCTION_DEFINITION,
                "description": "Fetch the full definition (name and parameter schema) of one function before executing it.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "function_name": {
                            "type": "string",
                            "description": "Exact name of the function"
                        }
                    },
                    "required": ["function_name"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": EXECUTE_FUNCTION,
                "description": "Execute one function with arguments matching its definition.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "function_name": {
                            "type": "string",
                            "description": "Exact name of the function to execute"
                        },
                        "function_arguments": {
                            "type": "object",
                            "description": "Arguments matching the function's parameter schema"
                        }
                    },
                    "required": ["function_name", "function_arguments"]
                }
            }
        }),
    ]
}
