//! Courier Core - Session and Transport Orchestration for Patient Chat
//!
//! This crate owns everything between a conversation surface and the chat
//! backend: getting a session, keeping a connection to the backend alive,
//! and turning whatever the backend sends into one message model. It has no
//! UI dependencies and can drive a terminal client, a mobile shell, or a
//! headless test harness.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Conversation Surface                      │
//! │            (terminal client, mobile shell, tests)             │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ send_text_message / on_message
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                         COURIER CORE                          │
//! │  ┌───────────────┐   ┌───────┴──────┐   ┌──────────────────┐  │
//! │  │   Session     │   │  ChatClient  │   │    Normalizer    │  │
//! │  │   Resolver    │   │   (facade)   │   │ (three dialects) │  │
//! │  └───────────────┘   └───────┬──────┘   └──────────────────┘  │
//! │                     ┌────────┴────────┐                       │
//! │              ┌──────┴──────┐   ┌──────┴──────┐                │
//! │              │  Realtime   │   │   Polling   │                │
//! │              │ (WebSocket) │   │ (HTTP/mock) │                │
//! │              └─────────────┘   └─────────────┘                │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatClient`]: the transport-agnostic facade surfaces talk to
//! - [`SessionResolver`]: finds or creates the backend session
//! - [`RealtimeChannel`]: WebSocket state machine with reconnect and keep-alive
//! - [`PollingChannel`] / [`ReplyPoller`]: HTTP send-then-poll, with a mock mode
//! - [`NormalizedMessage`]: the one message model every dialect maps to
//! - [`ConnectionInfo`]: observable connection state
//!
//! # Quick Start
//!
//! ```ignore
//! use courier_core::{load_config, ChatClient, SessionResolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!
//!     let resolver = SessionResolver::new(config.api.clone())?;
//!     let resolved = resolver.get_or_create_session("u1", "jhh-1", None).await?;
//!
//!     let client = ChatClient::new(&config)?;
//!     let _replies = client.on_message(|text| println!("{}", text.text));
//!
//!     client.set_session_token(resolved.session.session_token.clone());
//!     client.connect().await?;
//!     client.send_text_message("I have chest pain");
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`client`]: the [`ChatClient`] facade
//! - [`config`]: layered configuration (file, environment, command line)
//! - [`error`]: error taxonomy and the serializable [`ErrorInfo`]
//! - [`events`]: listener registry shared by the transports
//! - [`messages`]: normalized inbound and outbound message types
//! - [`normalize`]: inbound payload dialect handling
//! - [`schedule`]: cancellable timers and background tasks
//! - [`session`]: session model and resolver
//! - [`transport`]: realtime and polling transports plus the selector

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod messages;
pub mod normalize;
pub mod schedule;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use client::ChatClient;
pub use error::{ChatError, ErrorInfo};
pub use events::{ChatEvent, EventBus, Subscription, SubscriptionId};
pub use messages::{
    ChatText, ConsultationOffer, ControlFrame, MessageId, NormalizedMessage, OutboundMessage,
    SenderRole, TypingIndicator,
};
pub use normalize::{normalize_frame, normalize_value, NormalizeError};
pub use session::{ClientType, CreateSessionRequest, ResolvedSession, Session, SessionResolver};

// Transport exports
pub use transport::realtime::{InMemoryConnector, InMemoryServer, ServerPeer};
pub use transport::{
    create_transport, ActiveTransport, ConnectionInfo, ConnectionState, Connector,
    PollingChannel, PollingConfig, RealtimeChannel, RealtimeConfig, ReplyPoller, SendReceipt,
    TransportConfig, TransportType,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ApiConfig,
    ConfigError, ConfigOverrides, ConfigSource, CourierConfig, CourierToml,
};
