//! Transport Configuration
//!
//! Configuration types for selecting and tuning the active transport.
//! The selection is read once when configuration loads and is frozen for the
//! lifetime of the [`crate::ChatClient`] built from it.

use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Transport type selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Duplex WebSocket channel with keep-alive and reconnection
    ///
    /// The default; messages are pushed by the server as they are produced.
    #[default]
    Realtime,

    /// Request/response polling against the HTTP API
    ///
    /// Used when the duplex channel is disabled. Polling only runs while a
    /// reply is outstanding.
    Polling,
}

impl FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "realtime" | "websocket" | "ws" | "socket" => Ok(Self::Realtime),
            "polling" | "poll" | "http" => Ok(Self::Polling),
            other => Err(format!("unknown transport '{other}' (expected realtime or polling)")),
        }
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Realtime => write!(f, "realtime"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

/// Realtime channel settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Chat endpoint (e.g. `wss://api.example.org/ws/chat`); the session token
    /// is appended as the `session_token` query parameter
    pub url: String,

    /// How long an open attempt may take before it is aborted
    pub connect_timeout_ms: u64,

    /// Interval between `{"type":"ping"}` keep-alive frames while connected
    pub keepalive_interval_ms: u64,

    /// Fixed delay before each reconnect attempt
    pub reconnect_delay_ms: u64,

    /// Reconnect attempts before giving up (terminal `Error`)
    pub max_reconnect_attempts: u32,

    /// Whether an unclean close triggers automatic reconnection
    pub auto_reconnect: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/chat".to_string(),
            connect_timeout_ms: 10_000,
            keepalive_interval_ms: 30_000,
            reconnect_delay_ms: 3_000,
            max_reconnect_attempts: 5,
            auto_reconnect: true,
        }
    }
}

impl RealtimeConfig {
    /// Connection-establishment timeout
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Keep-alive period
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Delay between reconnect attempts
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Set the endpoint URL
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the reconnect cap
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Enable or disable automatic reconnection
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Build the socket URL for a session token
    ///
    /// # Errors
    ///
    /// Returns `UNEXPECTED_ERROR` if the configured URL does not parse.
    pub fn endpoint(&self, session_token: &str) -> Result<String, ChatError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ChatError::Unexpected(format!("Invalid realtime URL {}: {e}", self.url)))?;
        url.query_pairs_mut()
            .append_pair("session_token", session_token);
        Ok(url.into())
    }
}

/// Polling channel settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between polls while a reply is outstanding
    pub poll_interval_ms: u64,

    /// Polls without a reply before giving up on it
    pub max_polls_per_reply: u32,

    /// Serve canned replies from memory instead of the network
    pub mock: bool,

    /// Simulated latency of a mock send
    pub mock_send_delay_ms: u64,

    /// Simulated latency of a mock poll
    pub mock_poll_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_polls_per_reply: 30,
            mock: false,
            mock_send_delay_ms: 800,
            mock_poll_delay_ms: 400,
        }
    }
}

impl PollingConfig {
    /// Delay between polls
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Simulated mock send latency
    #[must_use]
    pub fn mock_send_delay(&self) -> Duration {
        Duration::from_millis(self.mock_send_delay_ms)
    }

    /// Simulated mock poll latency
    #[must_use]
    pub fn mock_poll_delay(&self) -> Duration {
        Duration::from_millis(self.mock_poll_delay_ms)
    }
}

/// Transport configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Which transport to use
    pub transport: TransportType,

    /// Connect as soon as a session token is available
    pub auto_connect: bool,

    /// Realtime channel settings
    pub realtime: RealtimeConfig,

    /// Polling channel settings
    pub polling: PollingConfig,
}

impl TransportConfig {
    /// Configuration for the realtime channel
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            transport: TransportType::Realtime,
            ..Default::default()
        }
    }

    /// Configuration for the polling channel against the live API
    #[must_use]
    pub fn polling() -> Self {
        Self {
            transport: TransportType::Polling,
            ..Default::default()
        }
    }

    /// Configuration for the polling channel in offline mock mode
    #[must_use]
    pub fn mock_polling() -> Self {
        let mut config = Self::polling();
        config.polling.mock = true;
        config
    }

    /// Check if the realtime channel is selected
    #[must_use]
    pub fn is_realtime(&self) -> bool {
        matches!(self.transport, TransportType::Realtime)
    }

    /// Check if the polling channel is selected
    #[must_use]
    pub fn is_polling(&self) -> bool {
        matches!(self.transport, TransportType::Polling)
    }
}
