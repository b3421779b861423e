//! Transport Factory
//!
//! Builds the single transport a client runs on. The inactive transport is
//! never constructed, so it cannot start on its own.

use std::sync::Arc;

use super::config::TransportType;
use super::polling::{PollingChannel, ReplyPoller};
use super::realtime::{Connector, RealtimeChannel};
use super::state::{ConnectionInfo, ConnectionState};
use crate::config::CourierConfig;
use crate::error::ChatError;
use crate::events::EventBus;

/// The one transport a client is bound to
#[derive(Debug)]
pub enum ActiveTransport {
    /// Duplex WebSocket channel
    Realtime(RealtimeChannel),
    /// HTTP polling driven by outstanding replies
    Polling(ReplyPoller),
}

impl ActiveTransport {
    /// Which transport this is
    #[must_use]
    pub fn kind(&self) -> TransportType {
        match self {
            Self::Realtime(_) => TransportType::Realtime,
            Self::Polling(_) => TransportType::Polling,
        }
    }

    /// Snapshot of the connection
    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        match self {
            Self::Realtime(channel) => channel.connection_info(),
            Self::Polling(poller) => poller.channel().connection_info(),
        }
    }

    /// Current state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        match self {
            Self::Realtime(channel) => channel.connection_state(),
            Self::Polling(poller) => poller.channel().connection_state(),
        }
    }
}

/// Create the transport selected by configuration
///
/// `connector` replaces the WebSocket connector for the realtime transport
/// and is ignored for polling.
///
/// # Errors
///
/// Returns `UNEXPECTED_ERROR` if the configuration fails validation, if the
/// HTTP client cannot be built, or if the realtime transport is selected with
/// no connector and the `websocket` feature disabled.
pub fn create_transport(
    config: &CourierConfig,
    bus: EventBus,
    connector: Option<Arc<dyn Connector>>,
) -> Result<ActiveTransport, ChatError> {
    config
        .validate()
        .map_err(|e| ChatError::Unexpected(e.to_string()))?;

    match config.transport.transport {
        TransportType::Realtime => {
            let connector = match connector {
                Some(connector) => connector,
                None => default_connector()?,
            };
            tracing::debug!(url = %config.transport.realtime.url, "Using realtime transport");
            Ok(ActiveTransport::Realtime(RealtimeChannel::with_bus(
                config.transport.realtime.clone(),
                connector,
                bus,
            )))
        }
        TransportType::Polling => {
            tracing::debug!(
                base_url = %config.api.base_url,
                mock = config.transport.polling.mock,
                "Using polling transport"
            );
            let channel =
                PollingChannel::with_bus(config.api.clone(), config.transport.polling.clone(), bus)?;
            Ok(ActiveTransport::Polling(ReplyPoller::new(Arc::new(channel))))
        }
    }
}

#[cfg(feature = "websocket")]
fn default_connector() -> Result<Arc<dyn Connector>, ChatError> {
    Ok(Arc::new(super::realtime::WebSocketConnector::new()))
}

#[cfg(not(feature = "websocket"))]
fn default_connector() -> Result<Arc<dyn Connector>, ChatError> {
    Err(ChatError::Unexpected(
        "realtime transport requires the websocket feature or a custom connector".to_string(),
    ))
}
