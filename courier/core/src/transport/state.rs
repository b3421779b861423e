//! Connection State
//!
//! Observable lifecycle of the active transport. Only the transport itself
//! moves between states; consumers read snapshots or watch for changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::ErrorInfo;

/// Lifecycle state of a transport
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Opening the channel
    Connecting,
    /// Open and usable
    Connected,
    /// Closed; no automatic recovery pending
    #[default]
    Disconnected,
    /// Waiting to retry after an unclean close
    Reconnecting,
    /// Failed; only an explicit `connect()` recovers
    Error,
}

impl ConnectionState {
    /// Whether messages can be sent right now
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Observational snapshot of a transport's connection
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Current state
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful connect
    pub reconnect_attempts: u32,
    /// When the channel last reached `Connected`
    pub last_connected_at: Option<DateTime<Utc>>,
    /// When the channel last closed
    pub last_disconnected_at: Option<DateTime<Utc>>,
    /// Most recent error, cleared on successful connect
    pub error: Option<ErrorInfo>,
}

impl ConnectionInfo {
    /// Whether the last error is the terminal reconnect exhaustion
    #[must_use]
    pub fn is_terminal_failure(&self) -> bool {
        self.state == ConnectionState::Error
            && self.error.as_ref().is_some_and(ErrorInfo::is_terminal)
    }
}

/// Create the watch pair a transport publishes its state through
pub(crate) fn info_channel() -> (watch::Sender<ConnectionInfo>, watch::Receiver<ConnectionInfo>) {
    watch::channel(ConnectionInfo::default())
}
