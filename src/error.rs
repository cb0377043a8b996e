//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror, plus the
//! quota/fatal classification the retry layer and callers rely on.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("{}", format_backend(.status, .message))]
    Backend {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("No image part in generation response")]
    NoImagePart,

    #[error("No {0} in generation response")]
    EmptyResponse(String),

    #[error("Video operation still running after {polls} polls")]
    VideoTimeout { polls: u32 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_backend(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("Gemini API error (status {}): {}", status, message),
        None => format!("Gemini API error: {}", message),
    }
}

/// Status code the backend attaches to rate-limit and quota rejections.
pub const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// How the resilience layer treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limit or quota exhaustion: retry, then degrade to a lower tier.
    Quota,
    /// Everything else: surfaced to the caller unchanged.
    Fatal,
}

impl Error {
    /// Builds a rate-limit rejection as the backend reports it.
    pub fn quota(message: impl Into<String>) -> Self {
        Error::Backend {
            status: Some(429),
            code: Some(RESOURCE_EXHAUSTED.to_string()),
            message: message.into(),
        }
    }

    /// Classifies the error, preferring the structured status over the message.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Backend { status, code, message } => {
                if *status == Some(429) || code.as_deref() == Some(RESOURCE_EXHAUSTED) {
                    ErrorClass::Quota
                } else if status.is_none() && code.is_none() && message_signals_quota(message) {
                    ErrorClass::Quota
                } else {
                    ErrorClass::Fatal
                }
            }
            Error::Http(e) => match e.status() {
                Some(status) if status.as_u16() == 429 => ErrorClass::Quota,
                _ => ErrorClass::Fatal,
            },
            Error::Generic(message) if message_signals_quota(message) => ErrorClass::Quota,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_quota(&self) -> bool {
        self.class() == ErrorClass::Quota
    }

    /// The notice a UI shows when this error reaches it.
    pub fn user_notice(&self) -> UserNotice {
        match self.class() {
            ErrorClass::Quota => UserNotice::Busy,
            ErrorClass::Fatal => UserNotice::Failure,
        }
    }
}

fn message_signals_quota(message: &str) -> bool {
    message.contains("429") || message.to_lowercase().contains("quota")
}

/// Two-tier user messaging for errors that escape the resilience layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserNotice {
    Busy,
    Failure,
}

impl UserNotice {
    pub fn message(self) -> &'static str {
        match self {
            UserNotice::Busy => {
                "Quota protection: the service is busy, automatic recovery has started. Please wait..."
            }
            UserNotice::Failure => "System error: please try the action again.",
        }
    }

    /// How long the notice stays on screen.
    pub fn display_for(self) -> Duration {
        match self {
            UserNotice::Busy => Duration::from_secs(6),
            UserNotice::Failure => Duration::from_secs(4),
        }
    }
}
