//! SMS notification channel
//!
//! Sends the notification text to a phone number through an HTTP SMS
//! gateway (textbelt-style API: one POST with phone, message and key).
//! No internal retry; a booking race is over long before a second
//! delivery attempt would land.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::Notification;

/// SMS channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    /// Gateway endpoint URL
    pub gateway_url: String,
    /// Destination phone number, E.164 formatted
    pub recipient: String,
    /// Gateway API key, if the gateway requires one
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl SmsConfig {
    /// Create a new SMS configuration
    pub fn new(gateway_url: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            recipient: recipient.into(),
            api_key: None,
            timeout_secs: default_timeout(),
        }
    }

    /// Set the gateway API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.gateway_url.is_empty() {
            return Err("SMS gateway URL cannot be empty".to_string());
        }
        if !self.gateway_url.starts_with("http://") && !self.gateway_url.starts_with("https://") {
            return Err("SMS gateway URL must start with http:// or https://".to_string());
        }
        if self.recipient.is_empty() {
            return Err("SMS recipient cannot be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// SMS notification channel
pub struct SmsChannel {
    config: SmsConfig,
    client: Client,
}

impl SmsChannel {
    /// Create a new SMS channel
    pub fn new(config: SmsConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn build_payload(&self, notification: &Notification) -> serde_json::Value {
        serde_json::json!({
            "phone": self.config.recipient,
            "message": notification.as_text(),
            "key": self.config.api_key,
        })
    }
}

#[async_trait]
impl Channel for SmsChannel {
    fn name(&self) -> &str {
        "sms"
    }

    async fn send(&self, notification: &Notification) -> ChannelResult<DeliveryStatus> {
        let payload = self.build_payload(notification);

        match self
            .client
            .post(&self.config.gateway_url)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    recipient = %self.config.recipient,
                    "SMS delivered"
                );
                Ok(DeliveryStatus::success("sms"))
            }
            Ok(response) => {
                let status = response.status();
                tracing::error!(status = %status, "SMS gateway rejected message");
                Ok(DeliveryStatus::failure("sms", format!("HTTP {status}")))
            }
            Err(e) => {
                tracing::error!(error = %e, "SMS delivery failed");
                Ok(DeliveryStatus::failure("sms", e.to_string()))
            }
        }
    }
}
