//! Configuration for ToolRelay
//!
//! All configuration comes from environment variables (a `.env` file is
//! loaded by `main` before this runs). Required credentials fail fast at
//! startup; tunables have defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Default chat model when `MODEL_NAME` is unset.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default maximum agent-loop rounds per request.
pub const DEFAULT_MAX_ROUNDS: u32 = 12;

/// Default wall-clock budget for one inbound request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Twilio account SID (basic-auth username for the REST API).
    pub twilio_account_sid: String,
    /// Twilio auth token (basic-auth password).
    pub twilio_auth_token: String,
    /// Sender number, e.g. "whatsapp:+14155238886".
    pub twilio_from_number: String,

    /// OpenAI-compatible chat completions endpoint base URL.
    pub model_base_url: String,
    /// API key for the model endpoint.
    pub model_api_key: String,
    /// Model name sent with every chat request.
    pub model_name: String,

    /// Tool registry base URL.
    pub registry_base_url: String,
    /// API key for the tool registry.
    pub registry_api_key: String,
    /// Account/tenant identity tool executions run as.
    pub linked_account_id: String,
    /// Explicit allow-list of app providers tool executions are
    /// restricted to. Empty means the registry's own default scoping.
    pub allowed_apps: Vec<String>,

    /// Image host (Cloudinary-style) cloud name, if media delivery is
    /// configured.
    pub image_host_cloud: Option<String>,
    /// Unsigned upload preset for the image host.
    pub image_host_preset: Option<String>,

    /// Maximum agent-loop rounds before the request is aborted.
    pub max_rounds: u32,
    /// Wall-clock budget for one inbound request.
    pub request_timeout: Duration,
    /// Directory session JSON files are persisted under. None disables
    /// persistence (memory only).
    pub session_dir: Option<PathBuf>,
    /// Webhook listen port.
    pub port: u16,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RelayError::Config(format!("{name} is not set")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Config` when a required credential is missing
    /// or a numeric tunable fails to parse.
    pub fn from_env() -> Result<Self> {
        let max_rounds = match optional("MAX_ROUNDS") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| RelayError::Config(format!("MAX_ROUNDS is not a number: {v}")))?,
            None => DEFAULT_MAX_ROUNDS,
        };
        if max_rounds == 0 {
            return Err(RelayError::Config("MAX_ROUNDS must be at least 1".into()));
        }

        let timeout_secs = match optional("REQUEST_TIMEOUT_SECS") {
            Some(v) => v.parse::<u64>().map_err(|_| {
                RelayError::Config(format!("REQUEST_TIMEOUT_SECS is not a number: {v}"))
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let port = match optional("PORT") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|_| RelayError::Config(format!("PORT is not a number: {v}")))?,
            None => 5000,
        };

        let allowed_apps = optional("ALLOWED_APPS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let session_dir = match optional("SESSION_DIR") {
            Some(v) => Some(PathBuf::from(v)),
            None => Self::default_dir().map(|d| d.join("sessions")),
        };

        Ok(Self {
            twilio_account_sid: required("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: required("TWILIO_AUTH_TOKEN")?,
            twilio_from_number: required("TWILIO_PHONE_NUMBER")?,
            model_base_url: optional("MODEL_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model_api_key: required("OPENAI_API_KEY")?,
            model_name: optional("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            registry_base_url: required("REGISTRY_BASE_URL")?,
            registry_api_key: required("REGISTRY_API_KEY")?,
            linked_account_id: required("LINKED_ACCOUNT_OWNER_ID")?,
            allowed_apps,
            image_host_cloud: optional("IMAGE_HOST_CLOUD"),
            image_host_preset: optional("IMAGE_HOST_PRESET"),
            max_rounds,
            request_timeout: Duration::from_secs(timeout_secs),
            session_dir,
            port,
        })
    }

    /// Base data directory (`~/.toolrelay`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".toolrelay"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var mutation is process-global; these tests serialize on a lock.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn set_required_vars() {
        std::env::set_var("TWILIO_ACCOUNT_SID", "ACxxxx");
        std::env::set_var("TWILIO_AUTH_TOKEN", "token");
        std::env::set_var("TWILIO_PHONE_NUMBER", "whatsapp:+15550006666");
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("REGISTRY_BASE_URL", "https://registry.example.com");
        std::env::set_var("REGISTRY_API_KEY", "rk-test");
        std::env::set_var("LINKED_ACCOUNT_OWNER_ID", "acct_1");
    }

    #[test]
    fn test_from_env_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        std::env::remove_var("MAX_ROUNDS");
        std::env::remove_var("MODEL_NAME");
        std::env::remove_var("ALLOWED_APPS");

        let config = Config::from_env().unwrap();
        assert_eq!(config.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(config.model_name, DEFAULT_MODEL);
        assert!(config.allowed_apps.is_empty());
    }

    #[test]
    fn test_missing_credential_fails() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        std::env::remove_var("LINKED_ACCOUNT_OWNER_ID");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("LINKED_ACCOUNT_OWNER_ID"));
    }

    #[test]
    fn test_allowed_apps_parsing() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        std::env::set_var("ALLOWED_APPS", "GMAIL, GOOGLE_CALENDAR,,SLACK ");

        let config = Config::from_env().unwrap();
        assert_eq!(config.allowed_apps, vec!["GMAIL", "GOOGLE_CALENDAR", "SLACK"]);
        std::env::remove_var("ALLOWED_APPS");
    }

    #[test]
    fn test_zero_max_rounds_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        std::env::set_var("MAX_ROUNDS", "0");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("MAX_ROUNDS"));
        std::env::remove_var("MAX_ROUNDS");
    }
}
