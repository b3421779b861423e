//! Chat Client
//!
//! The one interface a conversation surface talks to. Which transport sits
//! underneath is decided when the client is built and never changes; every
//! call below behaves the same way on both.
//!
//! # Example
//!
//! ```ignore
//! let config = courier_core::load_config()?;
//! let client = ChatClient::new(&config)?;
//!
//! let _replies = client.on_message(|text| println!("{}", text.text));
//! client.set_session_token(session.session_token);
//! client.connect().await?;
//!
//! client.send_text_message("I have chest pain");
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::config::CourierConfig;
use crate::error::{ChatError, ErrorInfo};
use crate::events::{ChatEvent, EventBus, Subscription};
use crate::messages::{ChatText, ConsultationOffer, NormalizedMessage, TypingIndicator};
use crate::transport::factory::{create_transport, ActiveTransport};
use crate::transport::realtime::Connector;
use crate::transport::state::{ConnectionInfo, ConnectionState};
use crate::transport::TransportType;

/// Transport-agnostic chat facade
///
/// Dropping the client disconnects it and cancels every pending timer.
#[derive(Debug)]
pub struct ChatClient {
    transport: ActiveTransport,
    bus: EventBus,
    auto_connect: bool,
    token: Mutex<Option<String>>,
}

impl ChatClient {
    /// Build a client on the configured transport
    ///
    /// # Errors
    ///
    /// Returns `UNEXPECTED_ERROR` if the transport cannot be constructed.
    pub fn new(config: &CourierConfig) -> Result<Self, ChatError> {
        Self::build(config, None)
    }

    /// Build a client whose realtime transport opens sockets through `connector`
    ///
    /// # Errors
    ///
    /// Returns `UNEXPECTED_ERROR` if the transport cannot be constructed.
    pub fn with_connector(
        config: &CourierConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ChatError> {
        Self::build(config, Some(connector))
    }

    fn build(config: &CourierConfig, connector: Option<Arc<dyn Connector>>) -> Result<Self, ChatError> {
        let bus = EventBus::new();
        let transport = create_transport(config, bus.clone(), connector)?;
        tracing::info!(transport = %transport.kind(), "Chat client ready");

        Ok(Self {
            transport,
            bus,
            auto_connect: config.transport.auto_connect,
            token: Mutex::new(None),
        })
    }

    /// Which transport this client is bound to
    #[must_use]
    pub fn transport_kind(&self) -> TransportType {
        self.transport.kind()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect if auto-connect is configured and a token is present
    ///
    /// Returns whether a connection was made.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::connect`].
    pub async fn start(&self) -> Result<bool, ChatError> {
        if !self.auto_connect {
            return Ok(false);
        }
        if self.token.lock().is_none() {
            tracing::debug!("Auto-connect skipped: no session token yet");
            return Ok(false);
        }
        self.connect().await.map(|()| true)
    }

    /// Connect the transport
    ///
    /// On polling this marks the channel ready with the stored token.
    ///
    /// # Errors
    ///
    /// `NO_TOKEN` without a token; on realtime also `CONNECTION_TIMEOUT` and
    /// `CONNECTION_FAILED`.
    pub async fn connect(&self) -> Result<(), ChatError> {
        match &self.transport {
            ActiveTransport::Realtime(channel) => channel.connect().await,
            ActiveTransport::Polling(poller) => {
                let token = self.token.lock().clone();
                match token {
                    Some(token) => {
                        poller.channel().initialize(token);
                        Ok(())
                    }
                    None => {
                        self.bus.emit(&ChatEvent::Error(ChatError::NoToken.info()));
                        Err(ChatError::NoToken)
                    }
                }
            }
        }
    }

    /// Disconnect and cancel every pending timer; safe to call repeatedly
    pub fn disconnect(&self) {
        match &self.transport {
            ActiveTransport::Realtime(channel) => channel.disconnect(),
            ActiveTransport::Polling(poller) => {
                poller.stop();
                poller.channel().reset();
            }
        }
    }

    /// Store the session token for the next `connect()`
    pub fn set_session_token(&self, token: impl Into<String>) {
        let token = token.into();
        if let ActiveTransport::Realtime(channel) = &self.transport {
            channel.set_session_token(token.clone());
        }
        *self.token.lock() = Some(token);
    }

    /// Replace the session token
    ///
    /// A connected transport switches to the new token immediately; on
    /// realtime that means a close and reopen.
    ///
    /// # Errors
    ///
    /// The reopen error on realtime.
    pub async fn update_session_token(&self, token: impl Into<String>) -> Result<(), ChatError> {
        let token = token.into();
        *self.token.lock() = Some(token.clone());

        match &self.transport {
            ActiveTransport::Realtime(channel) => channel.update_session_token(token).await,
            ActiveTransport::Polling(poller) => {
                if poller.channel().is_initialized() {
                    poller.channel().initialize(token);
                }
                Ok(())
            }
        }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send user text
    ///
    /// Returns `false` when the transport is not connected, or on polling
    /// while a reply is still outstanding. Nothing is queued.
    pub fn send_text_message(&self, text: &str) -> bool {
        match &self.transport {
            ActiveTransport::Realtime(channel) => channel.send_text(text),
            ActiveTransport::Polling(poller) => poller.send(text),
        }
    }

    /// Send a typing indicator
    ///
    /// Always succeeds on polling, where typing presence does not exist.
    pub fn send_typing_indicator(&self, user_id: &str, is_typing: bool) -> bool {
        match &self.transport {
            ActiveTransport::Realtime(channel) => channel.send_typing(user_id, is_typing),
            ActiveTransport::Polling(_) => true,
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Current state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.transport.connection_state()
    }

    /// Snapshot of the connection
    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        self.transport.connection_info()
    }

    /// Most recent connection error
    #[must_use]
    pub fn error(&self) -> Option<ErrorInfo> {
        self.transport.connection_info().error
    }

    /// Receiver that observes every connection change
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionInfo> {
        match &self.transport {
            ActiveTransport::Realtime(channel) => channel.watch_connection(),
            ActiveTransport::Polling(poller) => poller.channel().watch_connection(),
        }
    }

    /// Connection changes as a stream, starting with the current value
    #[must_use]
    pub fn connection_stream(&self) -> WatchStream<ConnectionInfo> {
        WatchStream::new(self.watch_connection())
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register a listener for every event
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    /// Register a listener for text messages
    pub fn on_message<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChatText) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let ChatEvent::Message(NormalizedMessage::Text(text)) = event {
                listener(text);
            }
        })
    }

    /// Register a listener for typing indicators
    pub fn on_typing<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TypingIndicator) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let ChatEvent::Message(NormalizedMessage::Typing(typing)) = event {
                listener(typing);
            }
        })
    }

    /// Register a listener for errors, local or server-sent
    pub fn on_error<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ErrorInfo) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| match event {
            ChatEvent::Error(info) | ChatEvent::Message(NormalizedMessage::Error(info)) => {
                listener(info);
            }
            _ => {}
        })
    }

    /// Register a listener for consultation handoffs
    pub fn on_consultation_offer<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConsultationOffer) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let ChatEvent::Message(NormalizedMessage::ConsultationOffer(offer)) = event {
                listener(offer);
            }
        })
    }

    /// Register a listener for connection changes
    pub fn on_connection_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionInfo) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let ChatEvent::ConnectionChanged(info) = event {
                listener(info);
            }
        })
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
