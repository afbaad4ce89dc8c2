//! Delivery module - outbound message adapter
//!
//! Renders the final agent result back to the originating user. The Twilio
//! adapter posts to the Messages REST endpoint; text above the WhatsApp
//! inline limit is truncated at a char boundary, and generated images ride
//! along as a hosted media URL rather than inline bytes.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{RelayError, Result};

/// WhatsApp inline body limit.
pub const MAX_BODY_CHARS: usize = 1600;

const TRUNCATION_MARKER: &str = "…";

/// Outbound delivery boundary.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Send `text` (and optionally a hosted media URL) to `to`.
    async fn deliver(&self, to: &str, text: &str, media_url: Option<&str>) -> Result<()>;
}

/// Twilio REST adapter.
pub struct TwilioDelivery {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioDelivery {
    pub fn new(account_sid: &str, auth_token: &str, from_number: &str) -> Self {
        Self::with_base_url("https://api.twilio.com", account_sid, auth_token, from_number)
    }

    /// Exposed for tests against a mock endpoint.
    pub fn with_base_url(
        base_url: &str,
        account_sid: &str,
        auth_token: &str,
        from_number: &str,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
        }
    }

    /// Clamp a body to the inline limit at a character boundary.
    fn truncate_body(text: &str) -> String {
        if text.chars().count() <= MAX_BODY_CHARS {
            return text.to_string();
        }
        let keep = MAX_BODY_CHARS - TRUNCATION_MARKER.chars().count();
        let mut body: String = text.chars().take(keep).collect();
        body.push_str(TRUNCATION_MARKER);
        body
    }
}

#[async_trait]
impl Delivery for TwilioDelivery {
    async fn deliver(&self, to: &str, text: &str, media_url: Option<&str>) -> Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let body = Self::truncate_body(text);
        let mut form = vec![
            ("Body", body.as_str()),
            ("From", self.from_number.as_str()),
            ("To", to),
        ];
        if let Some(media) = media_url {
            form.push(("MediaUrl", media));
        }

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| RelayError::Delivery(format!("Twilio request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(status = %status, "Twilio rejected message: {}", detail);
            return Err(RelayError::Delivery(format!("Twilio returned {status}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| RelayError::Delivery(format!("Twilio response unreadable: {e}")))?;
        info!(sid = data["sid"].as_str().unwrap_or("?"), to, "message sent");
        Ok(())
    }
}
