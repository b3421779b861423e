//! Conversation Messages
//!
//! The canonical inbound unit ([`NormalizedMessage`]) and the fixed-shape
//! outbound text message ([`OutboundMessage`]).
//!
//! # Design Philosophy
//!
//! The backend has spoken several payload dialects over time. Nothing above
//! the transports ever sees those dialects: both the realtime and the polling
//! channel reduce every inbound frame to a `NormalizedMessage` (see
//! [`crate::normalize`]) before it is dispatched.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorInfo;

/// Message code the backend assigns to plain user text
pub const TEXT_MESSAGE_CODE: u16 = 1011;

/// Message type string paired with [`TEXT_MESSAGE_CODE`]
pub const TEXT_MESSAGE_TYPE: &str = "text_message";

/// Unique identifier for a message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a fresh random identifier
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a text message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    /// The patient
    User,
    /// The remote assistant
    Assistant,
}

/// A conversational text event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatText {
    /// Server-assigned id, or a generated one
    pub id: MessageId,
    /// Message body
    pub text: String,
    /// Author
    pub sender: SenderRole,
    /// Server timestamp, or arrival time
    pub timestamp: DateTime<Utc>,
}

/// Someone started or stopped typing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingIndicator {
    /// Who is typing
    pub user_id: String,
    /// Started (true) or stopped (false)
    pub is_typing: bool,
}

/// The conversation is being handed to a live consultation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsultationOffer {
    /// Handoff headers forwarded verbatim to the consultation surface
    pub headers: BTreeMap<String, serde_json::Value>,
    /// Conversation the offer belongs to
    pub conversation_id: Option<String>,
}

/// Canonical inbound message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedMessage {
    /// Conversational text
    Text(ChatText),
    /// Typing presence
    Typing(TypingIndicator),
    /// Consultation handoff
    ConsultationOffer(ConsultationOffer),
    /// Error reported by the server
    Error(ErrorInfo),
}

impl NormalizedMessage {
    /// Short name of the variant, for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Typing(_) => "typing",
            Self::ConsultationOffer(_) => "consultation_offer",
            Self::Error(_) => "error",
        }
    }

    /// Text body, for text events
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(&t.text),
            _ => None,
        }
    }

    /// Sender role, for text events
    #[must_use]
    pub fn sender(&self) -> Option<SenderRole> {
        match self {
            Self::Text(t) => Some(t.sender),
            _ => None,
        }
    }

    /// Whether this message answers an outstanding user request
    ///
    /// Assistant text, a consultation handoff, or a server error all end the
    /// wait for a reply.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        match self {
            Self::Text(t) => t.sender == SenderRole::Assistant,
            Self::ConsultationOffer(_) | Self::Error(_) => true,
            Self::Typing(_) => false,
        }
    }
}

/// Outbound user text
///
/// Fixed shape: `{session_token?, message_code: 1011, message_type: "text_message", text, timestamp}`.
/// The realtime channel omits the token (it is bound to the socket URL); the
/// polling channel includes it in the request body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Session token (polling only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// Always [`TEXT_MESSAGE_CODE`]
    pub message_code: u16,
    /// Always [`TEXT_MESSAGE_TYPE`]
    pub message_type: String,
    /// Message body
    pub text: String,
    /// ISO-8601 send time (UTC, millisecond precision)
    pub timestamp: String,
}

impl OutboundMessage {
    /// Build a text message stamped with the current time
    ///
    /// Call this at send time, never ahead of it.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            session_token: None,
            message_code: TEXT_MESSAGE_CODE,
            message_type: TEXT_MESSAGE_TYPE.to_string(),
            text: text.into(),
            timestamp: iso_timestamp(Utc::now()),
        }
    }

    /// Attach the session token
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

/// Outbound control frames on the realtime channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Keep-alive
    Ping,
    /// Typing presence
    Typing {
        /// Who is typing
        user_id: String,
        /// Started or stopped
        is_typing: bool,
    },
}

/// Format a timestamp the way the backend expects (`2024-01-01T12:00:00.000Z`)
#[must_use]
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
