//! Prompt context assembly.

use crate::session::Message;

/// Default system instruction declaring the four meta-tools and the typical
/// discovery order.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to an unlimited \
number of tools via four meta functions: REGISTRY_SEARCH_APPS, REGISTRY_SEARCH_FUNCTIONS, \
REGISTRY_GET_FUNCTION_DEFINITION, and REGISTRY_EXECUTE_FUNCTION. \
Use REGISTRY_SEARCH_APPS to find relevant apps (each app groups a set of functions). \
If you find apps that might help, use REGISTRY_SEARCH_FUNCTIONS to find functions within them, \
or search for functions directly across all apps. \
Once you have identified the function you need, use REGISTRY_GET_FUNCTION_DEFINITION to get its \
definition, then REGISTRY_EXECUTE_FUNCTION to execute it with the correct input arguments. \
The typical order is REGISTRY_SEARCH_APPS -> REGISTRY_SEARCH_FUNCTIONS -> \
REGISTRY_GET_FUNCTION_DEFINITION -> REGISTRY_EXECUTE_FUNCTION.";

/// Builds the per-round prompt context for the agent loop.
///
/// Every round replays the system instruction, the triggering user message,
/// and the full ordered history (including envelopes appended by earlier
/// rounds of the same run).
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn build(&self, user_text: &str, history: &[Message]) -> Vec<Message> {
        let mut context = Vec::with_capacity(history.len() + 2);
        context.push(Message::system(&self.system_prompt));
        context.push(Message::user(user_text));
        context.extend_from_slice(history);
        context
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}
