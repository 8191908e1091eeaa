//! Unified error handling for the slotrace crate
//!
//! Domain modules keep their own error types ([`ClientError`],
//! [`PageError`], [`ChannelError`]); this module wraps them in a single
//! [`Error`] enum usable across module boundaries and classifies them
//! for handling strategies.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::client::{ClientError, PageError};
pub use crate::notifications::ChannelError;

/// Common interface for slotrace error types
pub trait SlotraceErrorTrait: std::error::Error {
    /// Check if this error is recoverable (worth retrying or polling on)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Backend payload shape errors
    Validation,
    /// Browser page / automation bridge errors
    Browser,
    /// Notification delivery errors
    Notification,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the slotrace crate
#[derive(Error, Debug)]
pub enum Error {
    /// Backend client errors (validation, API, transport)
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Browser page errors
    #[error("Page error: {0}")]
    Page(#[from] PageError),

    /// Notification channel errors
    #[error("Notification error: {0}")]
    Channel(#[from] ChannelError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SlotraceErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Client(e) => e.is_recoverable(),
            Self::Page(e) => matches!(e, PageError::Connection(_)),
            Self::Channel(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Client(e) => match e {
                ClientError::Validation { .. } => ErrorCategory::Validation,
                ClientError::Api { .. } | ClientError::Transport { .. } => ErrorCategory::Network,
                ClientError::InvalidUrl(_) | ClientError::Setup(_) => ErrorCategory::Config,
            },
            Self::Page(_) => ErrorCategory::Browser,
            Self::Channel(_) => ErrorCategory::Notification,
            Self::Io(_) => ErrorCategory::Other,
            Self::Json(_) => ErrorCategory::Validation,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
