//! ToolRelay - conversational WhatsApp relay with dynamic tool discovery
//!
//! ToolRelay receives a text message over a Twilio-style webhook, forwards
//! it to a language model that may request tool invocations, executes those
//! through a dynamic tool-discovery registry (four fixed meta-tools), feeds
//! results back to the model, and returns the final answer - optionally
//! with a generated image - to the user.
//!
//! Module map:
//! - [`agent`] - the tool-calling loop and prompt context
//! - [`session`] - conversation transcripts and the session store
//! - [`provider`] - the language model boundary
//! - [`tools`] - the tool invoker boundary and registry client
//! - [`channel`] - the inbound webhook
//! - [`delivery`] - the outbound Twilio adapter
//! - [`media`] - out-of-band image hosting

pub mod agent;
pub mod channel;
pub mod config;
pub mod delivery;
pub mod error;
pub mod media;
pub mod provider;
pub mod session;
pub mod tools;

pub use config::Config;
pub use error::{RelayError, Result};
