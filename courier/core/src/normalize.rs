//! Inbound Frame Normalization
//!
//! Reduces every historical payload dialect to one [`NormalizedMessage`]:
//!
//! | Dialect | Example |
//! |---|---|
//! | Typed envelope | `{"type": "ai_response", "message": "hello"}` |
//! | Legacy envelope | `{"message_type": "ai_response", "text": "hello"}` |
//! | Bare text | `{"text": "hello"}` |
//!
//! # Field Priority
//!
//! - Discriminator: `type`, then `message_type`.
//! - Body: `text`, then `message`, then `content`. A body field holding an
//!   object is searched for a nested `text`/`content` string.
//! - Id: `id`, then `message_id` (string or number); generated when absent.
//! - Timestamp: `timestamp`, then `created_at` (RFC 3339 or epoch millis);
//!   arrival time when absent.
//!
//! Frames that are not JSON objects are rejected with a [`NormalizeError`].
//! Control frames (`ping`, `pong`, `ack`, ...) and frames carrying nothing
//! displayable normalize to `None`; neither is ever fatal to a channel.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ErrorInfo;
use crate::messages::{
    ChatText, ConsultationOffer, MessageId, NormalizedMessage, SenderRole, TypingIndicator,
};

/// Discriminator fields, highest priority first
const DISCRIMINATOR_FIELDS: [&str; 2] = ["type", "message_type"];

/// Body fields, highest priority first
const BODY_FIELDS: [&str; 3] = ["text", "message", "content"];

/// Why a raw frame could not be normalized
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// The frame is not valid JSON
    #[error("Frame is not valid JSON: {0}")]
    InvalidJson(String),

    /// The frame is JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,
}

/// What a discriminator value means
#[derive(Clone, Debug, PartialEq, Eq)]
enum FrameKind {
    AssistantText,
    UserText,
    Typing,
    Consultation,
    Error,
    Control,
    Unknown(String),
}

impl FrameKind {
    fn classify(discriminator: &str) -> Self {
        match discriminator.to_ascii_lowercase().as_str() {
            "ai_response" | "assistant_message" | "assistant" | "bot_message" | "bot_response"
            | "response" | "message" | "chat_message" => Self::AssistantText,
            "text_message" | "user_message" => Self::UserText,
            "typing" | "typing_indicator" | "user_typing" => Self::Typing,
            "consultation_offer" | "consultation" | "consultation_request" | "handoff" => {
                Self::Consultation
            }
            "error" | "error_message" => Self::Error,
            "ping" | "pong" | "heartbeat" | "ack" | "connected" | "connection_established" => {
                Self::Control
            }
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Parse and normalize one raw frame
///
/// # Errors
///
/// Returns an error if the frame is not a JSON object. Callers log and drop it.
pub fn normalize_frame(raw: &str) -> Result<Option<NormalizedMessage>, NormalizeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    Ok(normalize_value(&value))
}

/// Normalize one already-parsed frame
///
/// Returns `None` for non-objects, control frames, and frames with nothing to show.
#[must_use]
pub fn normalize_value(value: &Value) -> Option<NormalizedMessage> {
    let obj = value.as_object()?;
    let kind = discriminator(obj).map(FrameKind::classify);

    match kind {
        Some(FrameKind::AssistantText) => text_message(obj, SenderRole::Assistant),
        Some(FrameKind::UserText) => text_message(obj, SenderRole::User),
        Some(FrameKind::Typing) => Some(typing_message(obj)),
        Some(FrameKind::Consultation) => Some(consultation_message(obj)),
        Some(FrameKind::Error) => Some(error_message(obj)),
        Some(FrameKind::Control) => None,
        Some(FrameKind::Unknown(kind)) => {
            let msg = text_message(obj, SenderRole::Assistant);
            if msg.is_some() {
                tracing::debug!(kind = %kind, "Unknown frame type carries text, treating as chat text");
            } else {
                tracing::debug!(kind = %kind, "Ignoring unknown frame type without text");
            }
            msg
        }
        None => text_message(obj, SenderRole::Assistant),
    }
}

/// Pull the list of message frames out of a polling response
///
/// Accepts a bare array, `{"messages": [...]}`, and any of those wrapped in
/// `{"data": ...}`. Anything else yields an empty batch.
#[must_use]
pub fn extract_batch(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => {
            if let Some(Value::Array(items)) = obj.get("messages") {
                items.as_slice()
            } else if let Some(data) = obj.get("data") {
                extract_batch(data)
            } else {
                &[]
            }
        }
        _ => &[],
    }
}

/// Server-assigned id of a raw frame (`id` or `message_id`), if any
#[must_use]
pub fn raw_message_id(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    ["id", "message_id"]
        .iter()
        .find_map(|field| obj.get(*field).and_then(scalar_to_string))
}

// =============================================================================
// Field extraction
// =============================================================================

fn discriminator(obj: &Map<String, Value>) -> Option<&str> {
    DISCRIMINATOR_FIELDS
        .iter()
        .find_map(|field| obj.get(*field).and_then(Value::as_str))
}

fn body_text(obj: &Map<String, Value>) -> Option<String> {
    BODY_FIELDS.iter().find_map(|field| match obj.get(*field)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(nested) => ["text", "content"]
            .iter()
            .find_map(|f| nested.get(*f).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_string(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| obj.get(*field).and_then(scalar_to_string))
}

fn sender_override(obj: &Map<String, Value>) -> Option<SenderRole> {
    let role = first_string(obj, &["sender_role", "role", "sender"])?;
    match role.to_ascii_lowercase().as_str() {
        "user" | "patient" => Some(SenderRole::User),
        "assistant" | "ai" | "bot" | "agent" | "system" => Some(SenderRole::Assistant),
        _ => None,
    }
}

fn timestamp(obj: &Map<String, Value>) -> DateTime<Utc> {
    ["timestamp", "created_at"]
        .iter()
        .find_map(|field| match obj.get(*field)? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            _ => None,
        })
        .unwrap_or_else(Utc::now)
}

// =============================================================================
// Per-kind builders
// =============================================================================

fn text_message(obj: &Map<String, Value>, default_sender: SenderRole) -> Option<NormalizedMessage> {
    let text = body_text(obj)?;
    let id = first_string(obj, &["id", "message_id"]).map_or_else(MessageId::new, MessageId);

    Some(NormalizedMessage::Text(ChatText {
        id,
        text,
        sender: sender_override(obj).unwrap_or(default_sender),
        timestamp: timestamp(obj),
    }))
}

fn typing_message(obj: &Map<String, Value>) -> NormalizedMessage {
    let is_typing = ["is_typing", "isTyping", "typing"]
        .iter()
        .find_map(|field| obj.get(*field).and_then(Value::as_bool))
        .unwrap_or(true);

    NormalizedMessage::Typing(TypingIndicator {
        user_id: first_string(obj, &["user_id", "userId", "sender_id"]).unwrap_or_default(),
        is_typing,
    })
}

fn consultation_message(obj: &Map<String, Value>) -> NormalizedMessage {
    let headers: BTreeMap<String, Value> = obj
        .get("headers")
        .and_then(Value::as_object)
        .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    NormalizedMessage::ConsultationOffer(ConsultationOffer {
        headers,
        conversation_id: first_string(obj, &["conversation_id", "conversationId"]),
    })
}

fn error_message(obj: &Map<String, Value>) -> NormalizedMessage {
    let code = first_string(obj, &["code", "error_code"]).unwrap_or_else(|| "SERVER_ERROR".into());
    let message = body_text(obj)
        .or_else(|| first_string(obj, &["error"]))
        .unwrap_or_else(|| "Unknown server error".into());

    let mut info = ErrorInfo::new(code, message);
    if let Some(details) = obj.get("details") {
        info = info.with_details(details.clone());
    }
    NormalizedMessage::Error(info)
}
