//! Agent module - the tool-calling loop and context building
//!
//! The agent drives the conversation for one inbound message:
//!
//! - Builds the prompt context from the system instruction, the user
//!   message, and the session history
//! - Calls the model with the four declared meta-tool schemas
//! - Executes requested tool calls through the registry and feeds results
//!   back to the model
//! - Terminates on a free-text reply, an empty turn, or the round budget
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Webhook   │────>│  AgentLoop  │────>│ ModelClient │
//! │  (inbound)  │     │             │     │  (chat API) │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Session   │     │ ToolInvoker │
//!                     │    Store    │     │ (registry)  │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use toolrelay::agent::{AgentLoop, ContextBuilder};
//! use toolrelay::provider::OpenAiClient;
//! use toolrelay::tools::{CallerIdentity, RegistryClient};
//!
//! async fn run_once() {
//!     let model = Arc::new(OpenAiClient::new("https://api.openai.com/v1", "sk-...", "gpt-4o").unwrap());
//!     let tools = Arc::new(RegistryClient::new("https://registry.example.com", "rk-...").unwrap());
//!     let identity = CallerIdentity { account_id: "acct_1".into(), allowed_apps: vec![] };
//!
//!     let agent = AgentLoop::new(model, tools, ContextBuilder::default(), identity, 12);
//!     let outcome = agent.run("What's on my calendar today?", Vec::new()).await.unwrap();
//!     println!("{:?}", outcome.reply);
//! }
//! ```

mod context;
mod r#loop;

pub use context::{ContextBuilder, DEFAULT_SYSTEM_PROMPT};
pub use r#loop::{AgentLoop, RunOutcome};
