//! HTTP client for the dynamic tool registry.
//!
//! Dispatches the four meta-tools onto the registry's REST endpoints.
//! Argument validation happens before any dispatch: a missing or mistyped
//! required field is a structured failure, never a silent no-op.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};

use super::{
    CallerIdentity, ToolInvoker, ToolOutcome, EXECUTE_FUNCTION, GET_FUNCTION_DEFINITION,
    SEARCH_APPS, SEARCH_FUNCTIONS,
};

/// Registry-backed tool invoker.
pub struct RegistryClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RegistryClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RelayError::Tool(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn require_str<'a>(args: &'a Value, field: &str) -> std::result::Result<&'a str, ToolOutcome> {
        args.get(field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ToolOutcome::failure(
                    "invalid_arguments",
                    format!("missing required string argument '{field}'"),
                )
            })
    }

    async fn post(&self, url: &str, body: Value) -> Result<ToolOutcome> {
        debug!(url, "registry request");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Tool(format!("registry request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::Tool(format!("registry response read failed: {e}")))?;

        if !status.is_success() {
            warn!(status = %status, url, "registry error response");
            return Ok(ToolOutcome::failure(
                "registry_error",
                format!("registry returned {status}: {text}"),
            ));
        }

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| RelayError::Tool(format!("unparseable registry response: {e}")))?;
        Ok(ToolOutcome::success(data))
    }

    async fn search_apps(&self, args: &Value) -> Result<ToolOutcome> {
        let query = match Self::require_str(args, "query") {
            Ok(q) => q,
            Err(failure) => return Ok(failure),
        };
        let mut body = json!({"query": query});
        if let Some(limit) = args.get("limit").and_then(|v| v.as_u64()) {
            body["limit"] = json!(limit);
        }
        self.post(&format!("{}/v1/apps/search", self.base_url), body)
            .await
    }

    async fn search_functions(&self, args: &Value) -> Result<ToolOutcome> {
        let query = match Self::require_str(args, "query") {
            Ok(q) => q,
            Err(failure) => return Ok(failure),
        };
        let mut body = json!({"query": query});
        if let Some(apps) = args.get("app_names").and_then(|v| v.as_array()) {
            body["app_names"] = json!(apps);
        }
        if let Some(limit) = args.get("limit").and_then(|v| v.as_u64()) {
            body["limit"] = json!(limit);
        }
        self.post(&format!("{}/v1/functions/search", self.base_url), body)
            .await
    }

    async fn get_function_definition(&self, args: &Value) -> Result<ToolOutcome> {
        let name = match Self::require_str(args, "function_name") {
            Ok(n) => n,
            Err(failure) => return Ok(failure),
        };
        self.post(
            &format!("{}/v1/functions/{}/definition", self.base_url, name),
            json!({}),
        )
        .await
    }

    async fn execute_function(
        &self,
        args: &Value,
        identity: &CallerIdentity,
    ) -> Result<ToolOutcome> {
        let name = match Self::require_str(args, "function_name") {
            Ok(n) => n,
            Err(failure) => return Ok(failure),
        };
        let function_arguments = match args.get("function_arguments") {
            Some(v) if v.is_object() => v.clone(),
            _ => {
                return Ok(ToolOutcome::failure(
                    "invalid_arguments",
                    "missing required object argument 'function_arguments'",
                ))
            }
        };

        let mut body = json!({
            "function_input": function_arguments,
            "linked_account_owner_id": identity.account_id,
        });
        if !identity.allowed_apps.is_empty() {
            body["allowed_apps"] = json!(identity.allowed_apps);
        }

        info!(function = name, account = %identity.account_id, "executing registry function");
        self.post(
            &format!("{}/v1/functions/{}/execute", self.base_url, name),
            body,
        )
        .await
    }
}

#[async_trait]
impl ToolInvoker for RegistryClient {
    async fn execute(
        &self,
        name: &str,
        arguments: Value,
        identity: &CallerIdentity,
    ) -> Result<ToolOutcome> {
        match name {
            SEARCH_APPS => self.search_apps(&arguments).await,
            SEARCH_FUNCTIONS => self.search_functions(&arguments).await,
            GET_FUNCTION_DEFINITION => self.get_function_definition(&arguments).await,
            EXECUTE_FUNCTION => self.execute_function(&arguments, identity).await,
            other => Ok(ToolOutcome::failure(
                "unknown_tool",
                format!("'{other}' is not a declared meta-tool"),
            )),
        }
    }
}
