//! Webhook delivery
//!
//! One JSON POST per job, no authentication header and no retry. Anything
//! other than a 2xx answer is a rejection carrying the remote status and
//! body.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use pdf_text_core::{ErrorKind, FileInfo};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

/// Body sent to the webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub text: String,
    pub file_name: String,
    pub file_size: u64,
    pub pages: u32,
    pub timestamp: String,
    /// Length of `text` as sent, after truncation
    pub text_length: usize,
}

impl WebhookPayload {
    /// Build the payload, truncating `text` to `max_text` characters
    pub fn new(text: &str, file_info: &FileInfo, max_text: usize) -> Self {
        let (text, truncated) = truncate_chars(text, max_text);
        if truncated {
            warn!(
                file = %file_info.name,
                limit = max_text,
                "Extracted text truncated for webhook delivery"
            );
        }

        Self {
            text_length: text.chars().count(),
            text: text.to_string(),
            file_name: file_info.name.clone(),
            file_size: file_info.size_bytes,
            pages: file_info.estimated_pages,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// First `max` characters of `text`, and whether anything was cut
pub fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (&text[..cut], true),
        None => (text, false),
    }
}

/// Successful delivery
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceipt {
    pub status: u16,
    /// Parsed JSON when the body is JSON, otherwise the raw text
    pub remote_response: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Webhook rejected delivery with status {status}")]
    Rejected { status: u16, body: Option<String> },

    #[error("Webhook unreachable: {0}")]
    Unreachable(String),
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::WebhookRejected
    }
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    url: String,
}

impl WebhookClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `payload` once
    pub async fn post(&self, payload: &WebhookPayload) -> Result<WebhookReceipt, DeliveryError> {
        info!(
            url = %self.url,
            file = %payload.file_name,
            text_length = payload.text_length,
            "Sending extracted text to webhook"
        );

        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.url, error = %e, "Webhook request failed");
                DeliveryError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %self.url, status = status.as_u16(), error = %e, "Failed to read webhook response body");
                String::new()
            }
        };

        if !status.is_success() {
            error!(url = %self.url, status = status.as_u16(), body = %body, "Webhook rejected delivery");
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: (!body.is_empty()).then_some(body),
            });
        }

        let remote_response = serde_json::from_str(&body)
            .unwrap_or_else(|_| serde_json::Value::String(body));
        info!(status = status.as_u16(), response = %remote_response, "Webhook accepted delivery");

        Ok(WebhookReceipt {
            status: status.as_u16(),
            remote_response,
        })
    }
}
