//! Realtime Transport
//!
//! Duplex WebSocket channel with a supervised lifecycle.
//!
//! - [`RealtimeChannel`]: the state machine (connect, keep-alive, reconnect)
//! - [`Connector`]: seam between the state machine and a concrete socket
//! - [`WebSocketConnector`]: production connector (`websocket` feature)
//! - [`InMemoryConnector`]: channel-backed connector for tests and demos

pub mod channel;
pub mod in_memory;
pub mod socket;
#[cfg(feature = "websocket")]
pub mod tungstenite;

pub use channel::RealtimeChannel;
pub use in_memory::{ConnectBehavior, InMemoryConnector, InMemoryServer, ServerPeer};
pub use socket::{Connector, Socket, SocketCommand, SocketEvent, CLOSE_NORMAL};
#[cfg(feature = "websocket")]
pub use tungstenite::WebSocketConnector;
