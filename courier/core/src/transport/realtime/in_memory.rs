//! In-Memory Connector
//!
//! Channel-backed [`Connector`] for driving the realtime channel without a
//! network. The test side holds an [`InMemoryServer`] and receives one
//! [`ServerPeer`] per accepted open.
//!
//! # Usage
//!
//! ```ignore
//! let (connector, mut server) = InMemoryConnector::pair();
//! let channel = RealtimeChannel::with_connector(config, connector.clone());
//!
//! channel.set_session_token("tok");
//! channel.connect().await?;
//!
//! let mut peer = server.accept().await.unwrap();
//! peer.send_text(r#"{"type":"ai_response","text":"hello"}"#);
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::socket::{Connector, Socket, SocketCommand, SocketEvent};
use crate::error::ChatError;
use crate::schedule;

/// How the connector answers the next `open`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Open succeeds and a peer is handed to the server
    #[default]
    Accept,
    /// Open fails immediately with `CONNECTION_FAILED`
    Refuse,
    /// Open never completes
    Hang,
    /// Open succeeds after a delay
    Delay(Duration),
}

#[derive(Debug, Default)]
struct ConnectorState {
    behavior: ConnectBehavior,
    open_count: u32,
    last_url: Option<String>,
}

/// In-memory socket connector
#[derive(Debug)]
pub struct InMemoryConnector {
    state: Mutex<ConnectorState>,
    accepted: mpsc::UnboundedSender<ServerPeer>,
}

impl InMemoryConnector {
    /// Create a connector and the server that receives its peers
    #[must_use]
    pub fn pair() -> (Arc<Self>, InMemoryServer) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            state: Mutex::new(ConnectorState::default()),
            accepted: accepted_tx,
        });
        (connector, InMemoryServer { accepted: accepted_rx })
    }

    /// Change how subsequent opens behave
    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        self.state.lock().behavior = behavior;
    }

    /// Number of `open` calls so far, whatever their outcome
    #[must_use]
    pub fn open_count(&self) -> u32 {
        self.state.lock().open_count
    }

    /// URL of the most recent `open`
    #[must_use]
    pub fn last_url(&self) -> Option<String> {
        self.state.lock().last_url.clone()
    }

    fn accept(&self, url: &str) -> Result<Socket, ChatError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let peer = ServerPeer {
            url: url.to_string(),
            frames: cmd_rx,
            events: event_tx,
        };
        self.accepted
            .send(peer)
            .map_err(|_| ChatError::ConnectionFailed("server gone".to_string()))?;
        Ok(Socket::new(cmd_tx, event_rx))
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn open(&self, url: &str) -> Result<Socket, ChatError> {
        let behavior = {
            let mut state = self.state.lock();
            state.open_count += 1;
            state.last_url = Some(url.to_string());
            state.behavior
        };

        match behavior {
            ConnectBehavior::Accept => self.accept(url),
            ConnectBehavior::Delay(delay) => {
                schedule::delay(delay).await;
                self.accept(url)
            }
            ConnectBehavior::Refuse => {
                Err(ChatError::ConnectionFailed("connection refused".to_string()))
            }
            ConnectBehavior::Hang => futures::future::pending().await,
        }
    }
}

/// Receives the server side of each accepted connection
#[derive(Debug)]
pub struct InMemoryServer {
    accepted: mpsc::UnboundedReceiver<ServerPeer>,
}

impl InMemoryServer {
    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> Option<ServerPeer> {
        self.accepted.recv().await
    }

    /// Take an already accepted connection, if any
    pub fn try_accept(&mut self) -> Option<ServerPeer> {
        self.accepted.try_recv().ok()
    }
}

/// Server side of one in-memory connection
///
/// Dropping the peer ends the connection without a close frame.
#[derive(Debug)]
pub struct ServerPeer {
    url: String,
    frames: mpsc::UnboundedReceiver<SocketCommand>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl ServerPeer {
    /// URL the client opened
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a text frame to the client
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.events.send(SocketEvent::Text(text.into())).is_ok()
    }

    /// Push a JSON frame to the client
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send_text(value.to_string())
    }

    /// Close with a close code
    pub fn close(self, code: u16) {
        let _ = self.events.send(SocketEvent::Closed { code: Some(code) });
    }

    /// Report a socket error without closing
    pub fn report_error(&self, message: impl Into<String>) -> bool {
        self.events.send(SocketEvent::Error(message.into())).is_ok()
    }

    /// End the connection but keep the peer, to watch what the client still sends
    pub fn hang_up(&self, code: Option<u16>) {
        let _ = self.events.send(SocketEvent::Closed { code });
    }

    /// Fail the connection the way a network drop does
    pub fn drop_connection(self) {
        let _ = self
            .events
            .send(SocketEvent::Error("connection reset".to_string()));
        let _ = self.events.send(SocketEvent::Closed { code: None });
    }

    /// Wait for the next command from the client
    ///
    /// Returns `None` once the client has released the socket.
    pub async fn next_frame(&mut self) -> Option<SocketCommand> {
        self.frames.recv().await
    }

    /// Take the next command from the client if one is queued
    pub fn try_next_frame(&mut self) -> Option<SocketCommand> {
        self.frames.try_recv().ok()
    }

    /// Wait for the next text frame, parsed as JSON, skipping close commands
    pub async fn next_json(&mut self) -> Option<serde_json::Value> {
        while let Some(frame) = self.next_frame().await {
            if let SocketCommand::Text(text) = frame {
                return serde_json::from_str(&text).ok();
            }
        }
        None
    }
}
