//! Transport Layer
//!
//! Two interchangeable ways of carrying one conversation:
//! - `Realtime`: a duplex WebSocket with keep-alive and bounded reconnection
//! - `Polling`: request/response against the HTTP API, with an offline mock mode
//!
//! # Design Philosophy
//!
//! The transport owns its [`ConnectionState`]; nothing above it sets state
//! directly. Both transports report through the same [`crate::events::EventBus`]
//! and normalize inbound payloads the same way, so the consumer cannot tell
//! which one is active. Exactly one transport is constructed per client
//! (see [`factory`]).

pub mod config;
pub mod factory;
pub mod polling;
pub mod realtime;
pub mod state;

// Re-exports for convenience
pub use config::{PollingConfig, RealtimeConfig, TransportConfig, TransportType};
pub use factory::{create_transport, ActiveTransport};
pub use polling::{PollingChannel, ReplyPoller, SendReceipt};
pub use realtime::{Connector, RealtimeChannel};
pub use state::{ConnectionInfo, ConnectionState};
