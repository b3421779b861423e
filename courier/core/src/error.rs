//! Error Taxonomy
//!
//! Every failure the core can surface is a [`ChatError`]. Each variant maps onto
//! one stable, UI-facing code string (see [`ChatError::code`]) so that consumers
//! can branch on the code without matching on Rust types.
//!
//! | Variant | Code |
//! |---|---|
//! | `NoToken` | `NO_TOKEN` |
//! | `ConnectionFailed` | `CONNECTION_FAILED` |
//! | `ConnectionTimeout` | `CONNECTION_TIMEOUT` |
//! | `Socket` | `SOCKET_ERROR` |
//! | `MaxReconnectAttempts` | `MAX_RECONNECT_ATTEMPTS` |
//! | `Http` | `HTTP_<status>` |
//! | `Network` | `NETWORK_ERROR` |
//! | `Unexpected` | `UNEXPECTED_ERROR` |
//! | `RequestInFlight` | `REQUEST_IN_FLIGHT` |
//! | `ResponseTimeout` | `RESPONSE_TIMEOUT` |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the session resolver and both transports
#[derive(Debug, Error)]
pub enum ChatError {
    /// No session token has been set
    #[error("No session token set")]
    NoToken,

    /// The channel could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The channel did not open before the connection timeout elapsed
    #[error("Connection attempt timed out after {}ms", .0.as_millis())]
    ConnectionTimeout(Duration),

    /// The open socket reported an error
    #[error("Socket error: {0}")]
    Socket(String),

    /// Automatic reconnection gave up
    #[error("Gave up after {0} reconnect attempts")]
    MaxReconnectAttempts(u32),

    /// Server answered with a non-success status
    #[error("Server returned HTTP {status}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, if any was readable
        body: String,
    },

    /// Request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// Anything the other variants do not describe (malformed responses, etc.)
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// A polling send is still waiting for its reply
    #[error("A message is already awaiting a reply")]
    RequestInFlight,

    /// Polling gave up waiting for a reply
    #[error("No reply after {0} polls")]
    ResponseTimeout(u32),
}

impl ChatError {
    /// Stable code string for this error
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::NoToken => "NO_TOKEN".to_string(),
            Self::ConnectionFailed(_) => "CONNECTION_FAILED".to_string(),
            Self::ConnectionTimeout(_) => "CONNECTION_TIMEOUT".to_string(),
            Self::Socket(_) => "SOCKET_ERROR".to_string(),
            Self::MaxReconnectAttempts(_) => "MAX_RECONNECT_ATTEMPTS".to_string(),
            Self::Http { status, .. } => format!("HTTP_{status}"),
            Self::Network(_) => "NETWORK_ERROR".to_string(),
            Self::Unexpected(_) => "UNEXPECTED_ERROR".to_string(),
            Self::RequestInFlight => "REQUEST_IN_FLIGHT".to_string(),
            Self::ResponseTimeout(_) => "RESPONSE_TIMEOUT".to_string(),
        }
    }

    /// Whether this error ends automatic recovery
    ///
    /// Terminal errors call for a hard UI-level action (re-authentication);
    /// everything else is transient.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MaxReconnectAttempts(_))
    }

    /// Cloneable snapshot of this error
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.code(), self.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Unexpected(format!("Malformed response body: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(format!("Malformed JSON: {err}"))
    }
}

/// Serializable error snapshot
///
/// Carried in `ConnectionInfo::error`, in error events, and as the body of
/// server-sent error frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Code string (`NO_TOKEN`, `HTTP_500`, or a server-chosen code)
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Extra structured context, if the server sent any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// Create a new error snapshot without details
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether this snapshot describes terminal connection loss
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.code == "MAX_RECONNECT_ATTEMPTS"
    }
}

impl From<&ChatError> for ErrorInfo {
    fn from(err: &ChatError) -> Self {
        err.info()
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
