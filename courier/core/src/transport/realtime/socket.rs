//! Socket Seam
//!
//! The realtime state machine never touches a concrete WebSocket. It asks a
//! [`Connector`] to open a [`Socket`], then talks to it over two channels:
//! commands go out, events come back. When the socket goes away the event
//! stream ends with exactly one [`SocketEvent::Closed`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChatError;

/// Normal closure close code
pub const CLOSE_NORMAL: u16 = 1000;

/// Commands sent to an open socket
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketCommand {
    /// Send a text frame
    Text(String),
    /// Close the socket with a close code
    Close {
        /// Close code
        code: u16,
        /// Close reason
        reason: String,
    },
}

/// Events reported by an open socket
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame arrived
    Text(String),
    /// The socket closed; `None` when no close frame was received
    Closed {
        /// Close code from the peer, if any
        code: Option<u16>,
    },
    /// The socket reported an error; a `Closed` follows
    Error(String),
}

/// An open socket, as a pair of channels
#[derive(Debug)]
pub struct Socket {
    /// Commands to the socket
    pub outbound: mpsc::UnboundedSender<SocketCommand>,
    /// Events from the socket
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

impl Socket {
    /// Build a socket from its channel halves
    #[must_use]
    pub fn new(
        outbound: mpsc::UnboundedSender<SocketCommand>,
        inbound: mpsc::UnboundedReceiver<SocketEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens sockets for the realtime channel
///
/// Implementations must not apply their own timeout; the channel bounds
/// `open` with the configured connection timeout.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`
    ///
    /// # Errors
    ///
    /// Returns `CONNECTION_FAILED` if the socket cannot be opened.
    async fn open(&self, url: &str) -> Result<Socket, ChatError>;
}
