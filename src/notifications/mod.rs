//! Outbound notifications
//!
//! Lifecycle events worth a human's attention (a slot appeared, the
//! booking succeeded or failed, the backend went dark) are pushed
//! through one or more delivery channels. Delivery is strictly
//! best-effort: a failed send is logged and never retried, and no
//! channel failure is ever fatal to the coordinator.

pub mod channels;
mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Re-exports
pub use channels::sms::{SmsChannel, SmsConfig};
pub use channels::{Channel, ChannelError, ChannelResult, DeliveryStatus};
pub use manager::Notifier;

/// Severity level of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, tracking only
    Info,
    /// Needs attention soon
    Warning,
    /// Drop everything
    Critical,
}

impl Severity {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One message bound for the configured channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    /// Render as a single SMS-sized line
    pub fn as_text(&self) -> String {
        format!("[{}] {}: {}", self.severity, self.title, self.body)
    }
}
