//! WebSocket Connector
//!
//! Production [`Connector`] backed by `tokio-tungstenite`. The stream is split
//! and driven by two tasks: a writer draining [`SocketCommand`]s into the
//! sink, and a reader turning frames into [`SocketEvent`]s.

use std::borrow::Cow;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::socket::{Connector, Socket, SocketCommand, SocketEvent};
use crate::error::ChatError;

/// Opens real WebSocket connections
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Socket, ChatError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ChatError::ConnectionFailed(e.to_string()))?;

        let (mut sink, mut source) = stream.split();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<SocketCommand>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<SocketEvent>();

        // Writer: commands -> sink
        tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                let result = match command {
                    SocketCommand::Text(text) => sink.send(Message::Text(text)).await,
                    SocketCommand::Close { code, reason } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: Cow::Owned(reason),
                        };
                        let result = sink.send(Message::Close(Some(frame))).await;
                        if let Err(e) = result {
                            tracing::debug!(error = %e, "Close frame not delivered");
                        }
                        return;
                    }
                };

                if let Err(e) = result {
                    tracing::warn!(error = %e, "WebSocket write error");
                    break;
                }
            }

            // Owner went away without a close
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "WebSocket sink close failed");
            }
        });

        // Reader: stream -> events
        tokio::spawn(async move {
            let mut close_code = None;

            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if event_tx.send(SocketEvent::Text(text)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if event_tx.send(SocketEvent::Text(text)).is_err() {
                                return;
                            }
                        }
                        Err(_) => tracing::debug!("Dropping non-UTF-8 binary frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        close_code = frame.map(|f| u16::from(f.code));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "WebSocket read error");
                        let _ = event_tx.send(SocketEvent::Error(e.to_string()));
                        break;
                    }
                }
            }

            let _ = event_tx.send(SocketEvent::Closed { code: close_code });
        });

        tracing::debug!("WebSocket opened");
        Ok(Socket::new(cmd_tx, event_rx))
    }
}
