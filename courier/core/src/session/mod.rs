//! Session Model
//!
//! A [`Session`] is what the chat transports authenticate with. It is obtained
//! once per conversation by the [`SessionResolver`] and never persisted here.
//!
//! The backend answers session calls in two shapes, and both must produce the
//! same [`Session`]:
//!
//! ```json
//! {"success": true, "data": {"session_id": "s1", "session_token": "t1", "user_id": "u1"}}
//! {"session_id": "s1", "session_token": "t1", "user_id": "u1"}
//! ```

mod resolver;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use resolver::{ResolvedSession, SessionResolver};

/// Kind of client creating a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Native mobile app
    #[default]
    Mobile,
    /// Browser
    Web,
}

impl FromStr for ClientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mobile" => Ok(Self::Mobile),
            "web" => Ok(Self::Web),
            other => Err(format!("unknown client type '{other}' (expected mobile or web)")),
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mobile => write!(f, "mobile"),
            Self::Web => write!(f, "web"),
        }
    }
}

/// Body of a create-session request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Device the conversation runs on
    pub device_id: String,
    /// Mobile or web
    pub client_type: ClientType,
    /// Primary user identity
    pub user_id: String,
    /// Secondary identity in the care provider's system
    pub user_jhh_id: String,
}

/// An authenticated chat session
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Server-side session id
    pub session_id: String,
    /// Token the transports authenticate with
    pub session_token: String,
    /// Owner of the session
    pub user_id: String,
    /// Request correlation id, if the backend issued one
    pub correlation_id: Option<String>,
    /// Conversation this session belongs to
    pub conversation_id: Option<String>,
    /// Lifetime in seconds from `obtained_at`
    pub expires_in: Option<u64>,
    /// When this client received the session
    pub obtained_at: DateTime<Utc>,
}

impl Session {
    /// Extract a session from a response body
    ///
    /// Tries the wrapped `{success, data}` shape first, then the flat shape.
    /// Returns `None` unless `session_id` and `session_token` are both present.
    #[must_use]
    pub fn from_payload(body: &Value, obtained_at: DateTime<Utc>) -> Option<Self> {
        body.get("data")
            .filter(|data| data.is_object())
            .and_then(|data| Self::from_fields(data, obtained_at))
            .or_else(|| Self::from_fields(body, obtained_at))
    }

    fn from_fields(fields: &Value, obtained_at: DateTime<Utc>) -> Option<Self> {
        let session_id = id_field(fields, "session_id")?;
        let session_token = fields.get("session_token")?.as_str()?.to_string();

        Some(Self {
            session_id,
            session_token,
            user_id: id_field(fields, "user_id").unwrap_or_default(),
            correlation_id: id_field(fields, "correlation_id"),
            conversation_id: id_field(fields, "conversation_id"),
            expires_in: fields.get("expires_in").and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            }),
            obtained_at,
        })
    }

    /// When the session stops being valid; `None` if it never expires or the
    /// lifetime is beyond the representable range
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        self.obtained_at.checked_add_signed(Duration::try_seconds(secs)?)
    }

    /// Whether the session has expired at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }
}

// Keep the token out of logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("session_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("correlation_id", &self.correlation_id)
            .field("conversation_id", &self.conversation_id)
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Read an identifier that may be a string or a number
fn id_field(fields: &Value, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
