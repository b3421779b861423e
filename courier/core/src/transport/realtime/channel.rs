//! Realtime Channel
//!
//! Supervises one duplex socket: opening it under a connection timeout,
//! keeping it alive with periodic pings, reconnecting after unclean closes,
//! and normalizing inbound frames onto the [`EventBus`].
//!
//! # State Machine
//!
//! ```text
//! Disconnected --connect()--> Connecting
//! Connecting   --open-------> Connected
//! Connecting   --timeout/refused--> Error
//! Connected    --close 1000--> Disconnected
//! Connected    --unclean close--> Reconnecting | Disconnected (auto-reconnect off)
//! Reconnecting --retry opens--> Connected
//! Reconnecting --retry fails, attempts < max--> Reconnecting
//! Reconnecting --attempts >= max--> Error (terminal)
//! any          --disconnect()--> Disconnected
//! ```
//!
//! # Re-entrancy
//!
//! Every attempt carries the generation it was started under. `connect()` and
//! `disconnect()` bump the generation, so a socket, close or timer belonging to
//! an older attempt finds itself stale and does nothing. The state lock is
//! never held across an await, and events are emitted only after it is
//! released, so listeners may call back into the channel.

use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use super::socket::{Connector, Socket, SocketCommand, SocketEvent, CLOSE_NORMAL};
use crate::error::ChatError;
use crate::events::{ChatEvent, EventBus, Subscription};
use crate::messages::{ControlFrame, OutboundMessage};
use crate::normalize::normalize_frame;
use crate::schedule::{self, TimerHandle};
use crate::transport::config::RealtimeConfig;
use crate::transport::state::{info_channel, ConnectionInfo, ConnectionState};

/// Mutable channel state, guarded by one lock
#[derive(Default)]
struct ChannelState {
    token: Option<String>,
    auto_reconnect: bool,
    generation: u64,
    info: ConnectionInfo,
    outbound: Option<mpsc::UnboundedSender<SocketCommand>>,
    keepalive: Option<TimerHandle>,
    reconnect: Option<TimerHandle>,
    pump: Option<AbortHandle>,
}

impl ChannelState {
    /// Stop every timer and task and forget the socket
    fn teardown(&mut self) -> Option<mpsc::UnboundedSender<SocketCommand>> {
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.cancel();
        }
        if let Some(reconnect) = self.reconnect.take() {
            reconnect.cancel();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.outbound.take()
    }
}

type Outbox = Vec<ChatEvent>;

struct Shared {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    bus: EventBus,
    info_tx: watch::Sender<ConnectionInfo>,
    state: Mutex<ChannelState>,
}

/// Supervised duplex chat channel
///
/// Dropping the channel runs the same path as [`RealtimeChannel::disconnect`].
pub struct RealtimeChannel {
    shared: Arc<Shared>,
}

impl RealtimeChannel {
    /// Create a channel that opens real WebSocket connections
    #[cfg(feature = "websocket")]
    #[must_use]
    pub fn new(config: RealtimeConfig) -> Self {
        Self::with_connector(config, Arc::new(super::WebSocketConnector::new()))
    }

    /// Create a channel over a custom connector
    #[must_use]
    pub fn with_connector(config: RealtimeConfig, connector: Arc<dyn Connector>) -> Self {
        Self::with_bus(config, connector, EventBus::new())
    }

    /// Create a channel that emits onto an existing bus
    #[must_use]
    pub fn with_bus(config: RealtimeConfig, connector: Arc<dyn Connector>, bus: EventBus) -> Self {
        let (info_tx, _) = info_channel();
        let state = ChannelState {
            auto_reconnect: config.auto_reconnect,
            ..Default::default()
        };

        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                bus,
                info_tx,
                state: Mutex::new(state),
            }),
        }
    }

    /// Open the channel
    ///
    /// A no-op when already connected. A second call while an earlier one is
    /// still opening supersedes it.
    ///
    /// # Errors
    ///
    /// - `NO_TOKEN` if no session token is set; nothing is opened
    /// - `CONNECTION_TIMEOUT` if the socket does not open in time
    /// - `CONNECTION_FAILED` if the socket cannot be opened, or the attempt
    ///   was cancelled by `disconnect()`
    pub async fn connect(&self) -> Result<(), ChatError> {
        self.shared.connect().await
    }

    /// Close the channel and cancel every pending timer
    ///
    /// Disables auto-reconnect first. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Send a text message
    ///
    /// Returns `false` without queueing when the channel is not connected.
    pub fn send_text(&self, text: &str) -> bool {
        let frame = match serde_json::to_string(&OutboundMessage::text(text)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode text message");
                return false;
            }
        };
        self.shared.send_frame(frame, "text")
    }

    /// Send a typing indicator
    ///
    /// Returns `false` when the channel is not connected.
    pub fn send_typing(&self, user_id: &str, is_typing: bool) -> bool {
        let control = ControlFrame::Typing {
            user_id: user_id.to_string(),
            is_typing,
        };
        let frame = match serde_json::to_string(&control) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode typing frame");
                return false;
            }
        };
        self.shared.send_frame(frame, "typing")
    }

    /// Replace the session token
    ///
    /// While connected this closes and reopens the socket with the new token;
    /// otherwise the token is stored for the next `connect()`.
    ///
    /// # Errors
    ///
    /// Returns the reconnect error when a forced reopen fails.
    pub async fn update_session_token(&self, token: impl Into<String>) -> Result<(), ChatError> {
        let was_connected = {
            let mut st = self.shared.state.lock();
            st.token = Some(token.into());
            st.info.state.is_connected()
        };

        if was_connected {
            tracing::info!("Session token changed; reopening realtime channel");
            self.shared.disconnect();
            self.shared.connect().await
        } else {
            Ok(())
        }
    }

    /// Store the session token without touching the connection
    pub fn set_session_token(&self, token: impl Into<String>) {
        self.shared.state.lock().token = Some(token.into());
    }

    /// Snapshot of the connection
    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        self.shared.state.lock().info.clone()
    }

    /// Current state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().info.state
    }

    /// Receiver that observes every connection change
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionInfo> {
        self.shared.info_tx.subscribe()
    }

    /// Register an event listener
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(listener)
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("state", &self.connection_state())
            .finish()
    }
}

// ============================================================================
// State machine
// ============================================================================

impl Shared {
    fn with_state<R>(&self, f: impl FnOnce(&mut ChannelState, &mut Outbox) -> R) -> R {
        let mut outbox = Outbox::new();
        let result = {
            let mut st = self.state.lock();
            f(&mut st, &mut outbox)
        };
        for event in &outbox {
            self.bus.emit(event);
        }
        result
    }

    /// Publish the current info to watchers and queue the change event
    fn publish(&self, st: &ChannelState, outbox: &mut Outbox) {
        self.info_tx.send_replace(st.info.clone());
        outbox.push(ChatEvent::ConnectionChanged(st.info.clone()));
    }

    async fn open_socket(&self, url: &str) -> Result<Socket, ChatError> {
        let limit = self.config.connect_timeout();
        match tokio::time::timeout(limit, self.connector.open(url)).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::ConnectionTimeout(limit)),
        }
    }

    async fn connect(self: &Arc<Self>) -> Result<(), ChatError> {
        enum Start {
            AlreadyConnected,
            NoToken,
            Open { generation: u64, token: String },
        }

        let start = self.with_state(|st, outbox| {
            if st.info.state.is_connected() {
                return Start::AlreadyConnected;
            }
            let Some(token) = st.token.clone() else {
                let info = ChatError::NoToken.info();
                st.info.error = Some(info.clone());
                self.publish(st, outbox);
                outbox.push(ChatEvent::Error(info));
                return Start::NoToken;
            };

            let stale = st.teardown();
            if let Some(outbound) = stale {
                let _ = outbound.send(SocketCommand::Close {
                    code: CLOSE_NORMAL,
                    reason: "superseded".to_string(),
                });
            }
            st.generation += 1;
            st.auto_reconnect = self.config.auto_reconnect;
            st.info.state = ConnectionState::Connecting;
            self.publish(st, outbox);

            Start::Open {
                generation: st.generation,
                token,
            }
        });

        let (generation, token) = match start {
            Start::AlreadyConnected => return Ok(()),
            Start::NoToken => {
                tracing::warn!("Realtime connect refused: no session token");
                return Err(ChatError::NoToken);
            }
            Start::Open { generation, token } => (generation, token),
        };

        tracing::info!(generation, "Opening realtime channel");
        let opened = match self.config.endpoint(&token) {
            Ok(url) => self.open_socket(&url).await,
            Err(e) => Err(e),
        };

        match opened {
            Ok(socket) => {
                if self.on_open(generation, socket) {
                    Ok(())
                } else {
                    Err(ChatError::ConnectionFailed(
                        "connection attempt cancelled".to_string(),
                    ))
                }
            }
            Err(err) => {
                self.fail_connect(generation, &err);
                Err(err)
            }
        }
    }

    fn fail_connect(&self, generation: u64, err: &ChatError) {
        self.with_state(|st, outbox| {
            if st.generation != generation {
                return;
            }
            tracing::warn!(error = %err, code = %err.code(), "Realtime connect failed");
            let info = err.info();
            st.info.state = ConnectionState::Error;
            st.info.error = Some(info.clone());
            self.publish(st, outbox);
            outbox.push(ChatEvent::Error(info));
        });
    }

    /// Adopt a freshly opened socket; returns `false` if the attempt was stale
    fn on_open(self: &Arc<Self>, generation: u64, socket: Socket) -> bool {
        let Socket { outbound, inbound } = socket;

        self.with_state(|st, outbox| {
            if st.generation != generation {
                tracing::debug!(generation, "Closing socket from stale attempt");
                let _ = outbound.send(SocketCommand::Close {
                    code: CLOSE_NORMAL,
                    reason: "superseded".to_string(),
                });
                return false;
            }

            if let Some(reconnect) = st.reconnect.take() {
                reconnect.release();
            }

            let ping_tx = outbound.clone();
            let period = self.config.keepalive_interval();
            st.keepalive = (!period.is_zero()).then(|| {
                schedule::every(period, move || match serde_json::to_string(&ControlFrame::Ping) {
                    Ok(ping) => {
                        if ping_tx.send(SocketCommand::Text(ping)).is_ok() {
                            tracing::debug!("Sent keep-alive ping");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to encode ping"),
                })
            });

            let pump = tokio::spawn(pump(Arc::downgrade(self), generation, inbound));
            st.pump = Some(pump.abort_handle());
            st.outbound = Some(outbound);

            st.info.state = ConnectionState::Connected;
            st.info.reconnect_attempts = 0;
            st.info.last_connected_at = Some(Utc::now());
            st.info.error = None;
            self.publish(st, outbox);

            tracing::info!(generation, "Realtime channel connected");
            true
        })
    }

    fn on_frame(&self, raw: &str) {
        match normalize_frame(raw) {
            Ok(Some(message)) => {
                tracing::debug!(kind = message.kind(), "Inbound message");
                self.bus.emit(&ChatEvent::Message(message));
            }
            Ok(None) => tracing::trace!("Consumed control frame"),
            Err(e) => tracing::warn!(error = %e, "Dropping malformed frame"),
        }
    }

    fn on_socket_error(&self, generation: u64, message: String) {
        self.with_state(|st, outbox| {
            if st.generation != generation {
                return;
            }
            tracing::warn!(error = %message, "Realtime socket error");
            let info = ChatError::Socket(message).info();
            st.info.error = Some(info.clone());
            self.publish(st, outbox);
            outbox.push(ChatEvent::Error(info));
        });
    }

    fn on_close(self: &Arc<Self>, generation: u64, code: Option<u16>) {
        self.with_state(|st, outbox| {
            if st.generation != generation {
                return;
            }

            if let Some(keepalive) = st.keepalive.take() {
                keepalive.cancel();
            }
            st.outbound = None;
            st.pump = None;
            st.info.last_disconnected_at = Some(Utc::now());

            let clean = code == Some(CLOSE_NORMAL);
            if clean || !st.auto_reconnect {
                tracing::info!(?code, "Realtime channel closed");
                st.info.state = ConnectionState::Disconnected;
                self.publish(st, outbox);
            } else {
                tracing::warn!(?code, "Realtime channel dropped");
                self.schedule_reconnect(st, outbox);
            }
        });
    }

    /// Queue the next retry, or give up once the cap is reached
    fn schedule_reconnect(self: &Arc<Self>, st: &mut ChannelState, outbox: &mut Outbox) {
        let max = self.config.max_reconnect_attempts;
        if st.info.reconnect_attempts >= max {
            let err = ChatError::MaxReconnectAttempts(max);
            tracing::error!(attempts = st.info.reconnect_attempts, "Realtime reconnection exhausted");
            let info = err.info();
            st.info.state = ConnectionState::Error;
            st.info.error = Some(info.clone());
            self.publish(st, outbox);
            outbox.push(ChatEvent::Error(info));
            return;
        }

        st.info.state = ConnectionState::Reconnecting;
        self.publish(st, outbox);

        let weak = Arc::downgrade(self);
        let generation = st.generation;
        st.reconnect = Some(schedule::after(
            self.config.reconnect_delay(),
            async move {
                if let Some(shared) = weak.upgrade() {
                    shared.retry(generation).await;
                }
            },
        ));
    }

    async fn retry(self: Arc<Self>, generation: u64) {
        let attempt = self.with_state(|st, outbox| {
            if st.generation != generation || st.info.state != ConnectionState::Reconnecting {
                return None;
            }
            // This task is the timer; don't abort it by replacing the slot later
            if let Some(reconnect) = st.reconnect.take() {
                reconnect.release();
            }
            st.info.reconnect_attempts += 1;
            self.publish(st, outbox);
            Some((st.info.reconnect_attempts, st.token.clone()))
        });

        let Some((attempt, token)) = attempt else {
            return;
        };
        tracing::info!(attempt, max = self.config.max_reconnect_attempts, "Reconnecting");

        let opened = match token {
            Some(token) => match self.config.endpoint(&token) {
                Ok(url) => self.open_socket(&url).await,
                Err(e) => Err(e),
            },
            None => Err(ChatError::NoToken),
        };

        match opened {
            Ok(socket) => {
                self.on_open(generation, socket);
            }
            Err(err) => self.with_state(|st, outbox| {
                if st.generation != generation {
                    return;
                }
                tracing::warn!(attempt, error = %err, "Reconnect attempt failed");
                let info = err.info();
                st.info.error = Some(info.clone());
                outbox.push(ChatEvent::Error(info));
                self.schedule_reconnect(st, outbox);
            }),
        }
    }

    fn disconnect(&self) {
        self.with_state(|st, outbox| {
            st.auto_reconnect = false;
            st.generation += 1;

            if let Some(outbound) = st.teardown() {
                let _ = outbound.send(SocketCommand::Close {
                    code: CLOSE_NORMAL,
                    reason: "client disconnect".to_string(),
                });
            }

            if st.info.state != ConnectionState::Disconnected {
                if st.info.state.is_connected() {
                    st.info.last_disconnected_at = Some(Utc::now());
                }
                st.info.state = ConnectionState::Disconnected;
                self.publish(st, outbox);
                tracing::info!("Realtime channel disconnected");
            }
        });
    }

    fn send_frame(&self, frame: String, kind: &'static str) -> bool {
        let st = self.state.lock();
        let Some(outbound) = st.outbound.as_ref().filter(|_| st.info.state.is_connected()) else {
            tracing::warn!(kind, state = %st.info.state, "Send rejected: channel not connected");
            return false;
        };
        outbound.send(SocketCommand::Text(frame)).is_ok()
    }
}

/// Drain socket events for one generation
async fn pump(
    shared: Weak<Shared>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<SocketEvent>,
) {
    loop {
        let event = inbound.recv().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };

        match event {
            Some(SocketEvent::Text(raw)) => shared.on_frame(&raw),
            Some(SocketEvent::Error(message)) => shared.on_socket_error(generation, message),
            Some(SocketEvent::Closed { code }) => {
                shared.on_close(generation, code);
                return;
            }
            None => {
                shared.on_close(generation, None);
                return;
            }
        }
    }
}
