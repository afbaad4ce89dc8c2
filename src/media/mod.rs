//! Media module - out-of-band image hosting
//!
//! Tool executions occasionally return generated images inline as base64.
//! Those are far above any inline transport threshold, so delivery goes
//! out-of-band: the bytes are uploaded to an image host and the message
//! references the resulting public URL instead.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{RelayError, Result};

/// Decoded inline image pulled out of a tool payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub data: Vec<u8>,
    pub mime: String,
}

/// Recursively scan a tool success payload for an inline base64 image.
///
/// Two shapes are recognized:
/// - a string value of the form `data:image/<fmt>;base64,<payload>`
/// - an object with an image `mime_type` and a base64 `data` field
///
/// The first match wins.
pub fn extract_inline_image(value: &Value) -> Option<InlineImage> {
    match value {
        Value::String(s) => parse_data_uri(s),
        Value::Object(map) => {
            if let (Some(mime), Some(data)) = (
                map.get("mime_type").and_then(|v| v.as_str()),
                map.get("data").and_then(|v| v.as_str()),
            ) {
                if mime.starts_with("image/") {
                    if let Ok(bytes) = BASE64.decode(data) {
                        return Some(InlineImage {
                            data: bytes,
                            mime: mime.to_string(),
                        });
                    }
                }
            }
            map.values().find_map(extract_inline_image)
        }
        Value::Array(items) => items.iter().find_map(extract_inline_image),
        _ => None,
    }
}

fn parse_data_uri(s: &str) -> Option<InlineImage> {
    let rest = s.strip_prefix("data:image/")?;
    let (format, payload) = rest.split_once(";base64,")?;
    let bytes = BASE64.decode(payload).ok()?;
    Some(InlineImage {
        data: bytes,
        mime: format!("image/{format}"),
    })
}

/// Upload boundary for hosted images.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload image bytes and return a public URL.
    async fn upload(&self, image: &InlineImage) -> Result<String>;
}

/// Cloudinary-style unsigned upload host.
///
/// Sends the image as a base64 data URI in a form field; the response's
/// `secure_url` is the hosted location.
pub struct CloudinaryHost {
    client: reqwest::Client,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryHost {
    pub fn new(cloud_name: &str, upload_preset: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            cloud_name: cloud_name.to_string(),
            upload_preset: upload_preset.to_string(),
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        )
    }
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, image: &InlineImage) -> Result<String> {
        let data_uri = format!("data:{};base64,{}", image.mime, BASE64.encode(&image.data));
        let form = [
            ("file", data_uri.as_str()),
            ("upload_preset", self.upload_preset.as_str()),
        ];

        let resp = self
            .client
            .post(self.upload_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| RelayError::Delivery(format!("image upload failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = %status, "image host rejected upload");
            return Err(RelayError::Delivery(format!("image host returned {status}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| RelayError::Delivery(format!("image host response unreadable: {e}")))?;

        let url = body["secure_url"]
            .as_str()
            .ok_or_else(|| RelayError::Delivery("image host response missing secure_url".into()))?
            .to_string();
        info!(url = %url, "uploaded image");
        Ok(url)
    }
}
