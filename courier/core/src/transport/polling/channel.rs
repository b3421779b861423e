//! Polling Channel
//!
//! Request/response transport against the chat API. Sending is a POST;
//! receiving is a GET that returns everything after a cursor. "Connected"
//! only means a session token has been set.

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use super::mock::MockResponder;
use crate::config::ApiConfig;
use crate::error::ChatError;
use crate::events::{ChatEvent, EventBus, Subscription};
use crate::messages::{NormalizedMessage, OutboundMessage};
use crate::normalize::{extract_batch, normalize_value, raw_message_id};
use crate::transport::config::PollingConfig;
use crate::transport::state::{info_channel, ConnectionInfo, ConnectionState};

/// Acknowledgement of a sent message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Id the server assigned, when it reported one
    pub message_id: Option<String>,
}

#[derive(Debug, Default)]
struct PollingState {
    token: Option<String>,
    cursor: Option<String>,
    info: ConnectionInfo,
}

/// Request/response chat transport
#[derive(Debug)]
pub struct PollingChannel {
    api: ApiConfig,
    http: reqwest::Client,
    config: PollingConfig,
    mock: Option<MockResponder>,
    bus: EventBus,
    info_tx: watch::Sender<ConnectionInfo>,
    state: Mutex<PollingState>,
}

impl PollingChannel {
    /// Create a channel against an API
    ///
    /// # Errors
    ///
    /// Returns `UNEXPECTED_ERROR` if the HTTP client cannot be built or the
    /// poll interval is zero.
    pub fn new(api: ApiConfig, config: PollingConfig) -> Result<Self, ChatError> {
        Self::with_bus(api, config, EventBus::new())
    }

    /// Create a channel that reports connection changes onto an existing bus
    ///
    /// # Errors
    ///
    /// Returns `UNEXPECTED_ERROR` if the HTTP client cannot be built or the
    /// poll interval is zero.
    pub fn with_bus(api: ApiConfig, config: PollingConfig, bus: EventBus) -> Result<Self, ChatError> {
        if config.poll_interval_ms == 0 {
            return Err(ChatError::Unexpected(
                "polling.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        let http = api.http_client()?;
        let mock = config
            .mock
            .then(|| MockResponder::new(config.mock_send_delay(), config.mock_poll_delay()));
        if mock.is_some() {
            tracing::info!("Polling channel running in mock mode");
        }
        let (info_tx, _) = info_channel();

        Ok(Self {
            api,
            http,
            config,
            mock,
            bus,
            info_tx,
            state: Mutex::new(PollingState::default()),
        })
    }

    /// Polling settings
    #[must_use]
    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Whether replies come from the offline responder
    #[must_use]
    pub fn is_mock(&self) -> bool {
        self.mock.is_some()
    }

    /// Set the session token and mark the channel connected
    ///
    /// Calling again overwrites the token; the cursor is kept only when the
    /// token is unchanged.
    pub fn initialize(&self, token: impl Into<String>) {
        let token = token.into();
        self.transition(|st| {
            if st.token.as_deref() != Some(token.as_str()) {
                st.cursor = None;
            }
            st.token = Some(token);
            if !st.info.state.is_connected() {
                st.info.state = ConnectionState::Connected;
                st.info.last_connected_at = Some(Utc::now());
                st.info.error = None;
            }
        });
        tracing::debug!("Polling channel initialized");
    }

    /// Forget the token, the cursor and any staged mock reply
    pub fn reset(&self) {
        if let Some(mock) = &self.mock {
            mock.reset();
        }
        self.transition(|st| {
            st.token = None;
            st.cursor = None;
            if st.info.state != ConnectionState::Disconnected {
                st.info.state = ConnectionState::Disconnected;
                st.info.last_disconnected_at = Some(Utc::now());
            }
        });
        tracing::debug!("Polling channel reset");
    }

    /// Whether a token is set
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().token.is_some()
    }

    /// Post a user message
    ///
    /// Callers should poll immediately afterwards rather than waiting for
    /// the next tick.
    ///
    /// # Errors
    ///
    /// `NO_TOKEN`, `HTTP_<status>`, `NETWORK_ERROR` or `UNEXPECTED_ERROR`.
    pub async fn send_message(&self, text: &str) -> Result<SendReceipt, ChatError> {
        let token = self.token()?;

        if let Some(mock) = &self.mock {
            let message_id = mock.send(text).await;
            return Ok(SendReceipt {
                message_id: Some(message_id),
            });
        }

        let outbound = OutboundMessage::text(text).with_session_token(token);
        let result = self.post_message(&outbound).await;
        self.record(&result);
        result
    }

    /// Fetch messages newer than the cursor
    ///
    /// A 404 is an empty batch. The cursor advances to the last message of a
    /// non-empty batch. Messages keep server order.
    ///
    /// # Errors
    ///
    /// `NO_TOKEN`, `HTTP_<status>`, `NETWORK_ERROR` or `UNEXPECTED_ERROR`.
    pub async fn poll_messages(&self) -> Result<Vec<NormalizedMessage>, ChatError> {
        let token = self.token()?;

        if let Some(mock) = &self.mock {
            return Ok(mock.poll().await);
        }

        let cursor = self.state.lock().cursor.clone();
        let result = self.fetch_messages(token, cursor).await;
        self.record(&result);
        result
    }

    /// Id of the newest message seen so far
    #[must_use]
    pub fn cursor(&self) -> Option<String> {
        self.state.lock().cursor.clone()
    }

    /// Snapshot of the connection
    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        self.state.lock().info.clone()
    }

    /// Current state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().info.state
    }

    /// Receiver that observes every connection change
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionInfo> {
        self.info_tx.subscribe()
    }

    /// Register an event listener
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    /// Bus this channel reports onto
    pub(crate) fn bus(&self) -> &EventBus {
        &self.bus
    }

    async fn post_message(&self, outbound: &OutboundMessage) -> Result<SendReceipt, ChatError> {
        let response = self
            .http
            .post(self.api.endpoint("message"))
            .json(outbound)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        // Some deployments answer with an empty body
        let bytes = response.bytes().await?;
        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        let message_id =
            raw_message_id(&body).or_else(|| body.get("data").and_then(raw_message_id));
        Ok(SendReceipt { message_id })
    }

    async fn fetch_messages(
        &self,
        token: String,
        cursor: Option<String>,
    ) -> Result<Vec<NormalizedMessage>, ChatError> {
        let mut query = vec![("session_token", token)];
        if let Some(cursor) = cursor {
            query.push(("last_message_id", cursor));
        }

        let response = self
            .http
            .get(self.api.endpoint("messages"))
            .query(&query)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = ensure_success(response).await?;

        let body: Value = response.json().await?;
        let batch = extract_batch(&body);
        if let Some(last) = batch.last().and_then(raw_message_id) {
            self.state.lock().cursor = Some(last);
        }

        let messages: Vec<NormalizedMessage> = batch.iter().filter_map(normalize_value).collect();
        if batch.len() != messages.len() {
            tracing::debug!(
                dropped = batch.len() - messages.len(),
                "Skipped unrecognized entries in poll batch"
            );
        }
        Ok(messages)
    }

    fn token(&self) -> Result<String, ChatError> {
        self.state.lock().token.clone().ok_or(ChatError::NoToken)
    }

    /// Apply a change and publish it if the info moved
    fn transition(&self, f: impl FnOnce(&mut PollingState)) {
        let changed = {
            let mut st = self.state.lock();
            let before = st.info.clone();
            f(&mut st);
            (st.info != before).then(|| {
                self.info_tx.send_replace(st.info.clone());
                st.info.clone()
            })
        };
        if let Some(info) = changed {
            self.bus.emit(&ChatEvent::ConnectionChanged(info));
        }
    }

    /// Keep the last request error in the connection info
    fn record<T>(&self, result: &Result<T, ChatError>) {
        match result {
            Ok(_) => self.transition(|st| st.info.error = None),
            Err(e) => {
                tracing::warn!(error = %e, code = %e.code(), "Polling request failed");
                let info = e.info();
                self.transition(|st| st.info.error = Some(info));
            }
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Http {
        status: status.as_u16(),
        body,
    })
}
