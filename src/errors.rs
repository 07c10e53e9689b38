use std::fmt;

use thiserror::Error;

/// A failure reported by the chat-completion transport.
///
/// This is the original failure signal: the gateway logs a classification of it
/// and hands it back to the caller untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// HTTP status of the failed call, if the request got far enough to have one.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "status {status}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        TransportError {
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }
}

/// Diagnostic classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request did not fit the model's token budget (HTTP 400).
    ContextWindowExceeded,
    /// The provider throttled us (HTTP 429).
    RateLimited,
    UnknownFailure,
}

impl FailureKind {
    #[must_use]
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(400) => FailureKind::ContextWindowExceeded,
            Some(429) => FailureKind::RateLimited,
            _ => FailureKind::UnknownFailure,
        }
    }

    #[must_use]
    pub fn classify(error: &TransportError) -> Self {
        Self::from_status(error.status)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::ContextWindowExceeded => "context_window_exceeded",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::UnknownFailure => "unknown_failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Task queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Task queue requires a running Tokio runtime")]
    NoRuntime,

    #[error("Queued task was aborted before producing a result")]
    TaskAborted,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} is not configured!")]
    MissingCredentials(String),

    #[error("Chat completion failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Failed to build API client: {0}")]
    Client(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// Classification of the underlying transport failure, if this is one.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            GatewayError::Transport(e) => Some(FailureKind::classify(e)),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Transport(e) => e.status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        GatewayError::Transport(error.into())
    }
}
