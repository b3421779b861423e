//! Realtime Channel Integration Tests
//!
//! Drives [`RealtimeChannel`] through the in-memory connector with tokio's
//! paused clock, so reconnect delays and timeouts run instantly and in order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::watch;

use courier_core::transport::realtime::{ConnectBehavior, SocketCommand, CLOSE_NORMAL};
use courier_core::{
    ChatClient, ChatEvent, ConnectionInfo, ConnectionState, CourierConfig, InMemoryConnector,
    NormalizedMessage, RealtimeChannel, RealtimeConfig, SenderRole, Subscription,
    TransportConfig,
};

// =============================================================================
// Helpers
// =============================================================================

fn config() -> RealtimeConfig {
    RealtimeConfig::default().with_url("ws://chat.test/ws/chat")
}

/// Collects every event the channel emits
struct Recorder {
    events: Arc<Mutex<Vec<ChatEvent>>>,
    _sub: Subscription,
}

impl Recorder {
    fn attach(channel: &RealtimeChannel) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let sub = channel.subscribe(move |event| sink.lock().push(event.clone()));
        Self { events, _sub: sub }
    }

    fn error_codes(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Error(info) => Some(info.code.clone()),
                _ => None,
            })
            .collect()
    }

    fn messages(&self) -> Vec<NormalizedMessage> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    fn states(&self) -> Vec<ConnectionState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ChatEvent::ConnectionChanged(info) => Some(info.state),
                _ => None,
            })
            .collect()
    }
}

async fn wait_for(
    rx: &mut watch::Receiver<ConnectionInfo>,
    what: impl FnMut(&ConnectionInfo) -> bool,
) -> ConnectionInfo {
    tokio::time::timeout(Duration::from_secs(120), rx.wait_for(what))
        .await
        .expect("timed out waiting for connection state")
        .expect("channel dropped")
        .clone()
}

// =============================================================================
// Connect
// =============================================================================

#[tokio::test]
async fn test_connect_without_token_opens_nothing() {
    let (connector, _server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector.clone());
    let recorder = Recorder::attach(&channel);

    let err = channel.connect().await.unwrap_err();

    assert_eq!(err.code(), "NO_TOKEN");
    assert_eq!(connector.open_count(), 0);
    assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
    assert_eq!(recorder.error_codes(), vec!["NO_TOKEN".to_string()]);
    assert_eq!(channel.connection_info().error.unwrap().code, "NO_TOKEN");
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout() {
    let (connector, _server) = InMemoryConnector::pair();
    connector.set_behavior(ConnectBehavior::Hang);
    let channel = RealtimeChannel::with_connector(config(), connector.clone());
    channel.set_session_token("tok");
    let recorder = Recorder::attach(&channel);

    let err = channel.connect().await.unwrap_err();

    assert_eq!(err.code(), "CONNECTION_TIMEOUT");
    assert_eq!(channel.connection_state(), ConnectionState::Error);
    assert_eq!(recorder.error_codes(), vec!["CONNECTION_TIMEOUT".to_string()]);
    assert_eq!(
        recorder.states(),
        vec![ConnectionState::Connecting, ConnectionState::Error]
    );
}

#[tokio::test]
async fn test_connect_refused() {
    let (connector, _server) = InMemoryConnector::pair();
    connector.set_behavior(ConnectBehavior::Refuse);
    let channel = RealtimeChannel::with_connector(config(), connector.clone());
    channel.set_session_token("tok");

    let err = channel.connect().await.unwrap_err();

    assert_eq!(err.code(), "CONNECTION_FAILED");
    assert_eq!(channel.connection_state(), ConnectionState::Error);
    assert_eq!(connector.open_count(), 1);
}

// =============================================================================
// Overlapping connect and disconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_connect_supersedes_pending_one() {
    let (connector, mut server) = InMemoryConnector::pair();
    connector.set_behavior(ConnectBehavior::Delay(Duration::from_secs(5)));
    let channel = Arc::new(RealtimeChannel::with_connector(config(), connector.clone()));
    channel.set_session_token("tok");
    let mut rx = channel.watch_connection();

    let first = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { channel.connect().await }
    });
    wait_for(&mut rx, |i| i.state == ConnectionState::Connecting).await;
    assert_eq!(connector.open_count(), 1);

    connector.set_behavior(ConnectBehavior::Accept);
    channel.connect().await.unwrap();
    let _current = server.accept().await.unwrap();

    let err = first.await.unwrap().unwrap_err();
    assert_eq!(err.code(), "CONNECTION_FAILED");

    let mut late = server.accept().await.unwrap();
    assert!(matches!(
        late.next_frame().await,
        Some(SocketCommand::Close { code: CLOSE_NORMAL, .. })
    ));
    assert_eq!(channel.connection_state(), ConnectionState::Connected);
    assert_eq!(connector.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_connecting_stays_disconnected() {
    let (connector, _server) = InMemoryConnector::pair();
    connector.set_behavior(ConnectBehavior::Hang);
    let channel = Arc::new(RealtimeChannel::with_connector(config(), connector.clone()));
    channel.set_session_token("tok");
    let recorder = Recorder::attach(&channel);
    let mut rx = channel.watch_connection();

    let pending = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { channel.connect().await }
    });
    wait_for(&mut rx, |i| i.state == ConnectionState::Connecting).await;

    channel.disconnect();
    assert!(pending.await.unwrap().is_err());

    // Well past the connect timeout and any reconnect delay
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        recorder.states(),
        vec![ConnectionState::Connecting, ConnectionState::Disconnected]
    );
    assert!(recorder.error_codes().is_empty());
    assert_eq!(connector.open_count(), 1);
}

// =============================================================================
// Inbound frames
// =============================================================================

#[tokio::test]
async fn test_all_dialects_reach_listeners() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector);
    channel.set_session_token("tok");
    let recorder = Recorder::attach(&channel);
    channel.connect().await.unwrap();
    let peer = server.accept().await.unwrap();
    let mut rx = channel.watch_connection();

    peer.send_json(&json!({"type": "ai_response", "message": "one"}));
    peer.send_json(&json!({"message_type": "ai_response", "text": "two"}));
    peer.send_json(&json!({"text": "three"}));
    // Closing afterwards guarantees the pump has drained the frames above
    peer.close(CLOSE_NORMAL);
    wait_for(&mut rx, |i| i.state == ConnectionState::Disconnected).await;

    let texts: Vec<String> = recorder
        .messages()
        .iter()
        .filter_map(|m| m.text().map(str::to_string))
        .collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_malformed_frame_is_dropped() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector);
    channel.set_session_token("tok");
    let recorder = Recorder::attach(&channel);
    channel.connect().await.unwrap();
    let peer = server.accept().await.unwrap();
    let mut rx = channel.watch_connection();

    peer.send_text("{not json");
    peer.send_json(&json!({"type": "ping"}));
    peer.send_json(&json!({"type": "ai_response", "text": "still here"}));
    peer.close(CLOSE_NORMAL);
    wait_for(&mut rx, |i| i.state == ConnectionState::Disconnected).await;

    let messages = recorder.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text(), Some("still here"));
    assert!(recorder.error_codes().is_empty());
}

// =============================================================================
// Close and reconnect
// =============================================================================

#[tokio::test]
async fn test_clean_close_does_not_reconnect() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector.clone());
    channel.set_session_token("tok");
    channel.connect().await.unwrap();
    let mut rx = channel.watch_connection();

    server.accept().await.unwrap().close(CLOSE_NORMAL);
    let info = wait_for(&mut rx, |i| i.state == ConnectionState::Disconnected).await;

    assert!(info.last_disconnected_at.is_some());
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unclean_close_reconnects_after_delay() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector.clone());
    channel.set_session_token("tok");
    channel.connect().await.unwrap();
    let mut rx = channel.watch_connection();

    server.accept().await.unwrap().close(1006);
    wait_for(&mut rx, |i| i.state == ConnectionState::Reconnecting).await;
    let started = tokio::time::Instant::now();

    let _peer = server.accept().await.unwrap();
    let info = wait_for(&mut rx, |i| i.state == ConnectionState::Connected).await;

    assert!(started.elapsed() >= Duration::from_millis(3000));
    assert_eq!(info.reconnect_attempts, 0);
    assert_eq!(connector.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_stops_after_unclean_close() {
    let (connector, mut server) = InMemoryConnector::pair();
    let mut config = config();
    config.reconnect_delay_ms = 600_000;
    let channel = RealtimeChannel::with_connector(config, connector.clone());
    channel.set_session_token("tok");
    channel.connect().await.unwrap();
    let mut rx = channel.watch_connection();
    let mut peer = server.accept().await.unwrap();

    peer.hang_up(Some(1006));
    wait_for(&mut rx, |i| i.state == ConnectionState::Reconnecting).await;

    // Every sender is gone once the keep-alive is cancelled; a live one
    // would deliver a ping after 30s of paused time instead
    assert_eq!(peer.next_frame().await, None);
    assert_eq!(channel.connection_state(), ConnectionState::Reconnecting);
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_max_attempts() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector.clone());
    channel.set_session_token("tok");
    let recorder = Recorder::attach(&channel);
    channel.connect().await.unwrap();
    let mut rx = channel.watch_connection();

    connector.set_behavior(ConnectBehavior::Refuse);
    server.accept().await.unwrap().drop_connection();

    let info = wait_for(&mut rx, |i| i.state == ConnectionState::Error).await;

    assert!(info.is_terminal_failure());
    assert_eq!(info.error.unwrap().code, "MAX_RECONNECT_ATTEMPTS");
    assert_eq!(info.reconnect_attempts, 5);
    assert_eq!(connector.open_count(), 6);
    assert_eq!(
        recorder.error_codes().last().map(String::as_str),
        Some("MAX_RECONNECT_ATTEMPTS")
    );

    // No further attempts are ever scheduled
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.open_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_disabled() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel =
        RealtimeChannel::with_connector(config().with_auto_reconnect(false), connector.clone());
    channel.set_session_token("tok");
    channel.connect().await.unwrap();
    let mut rx = channel.watch_connection();

    server.accept().await.unwrap().drop_connection();
    wait_for(&mut rx, |i| i.state == ConnectionState::Disconnected).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector.clone());
    channel.set_session_token("tok");
    channel.connect().await.unwrap();
    let mut rx = channel.watch_connection();

    server.accept().await.unwrap().drop_connection();
    wait_for(&mut rx, |i| i.state == ConnectionState::Reconnecting).await;

    channel.disconnect();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test]
async fn test_disconnect_twice() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector);
    channel.set_session_token("tok");
    let recorder = Recorder::attach(&channel);
    channel.connect().await.unwrap();
    let mut peer = server.accept().await.unwrap();

    channel.disconnect();
    channel.disconnect();

    assert_eq!(
        recorder.states(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected
        ]
    );
    assert!(matches!(
        peer.next_frame().await,
        Some(SocketCommand::Close { code: CLOSE_NORMAL, .. })
    ));
    assert!(!channel.send_text("after disconnect"));
}

// =============================================================================
// Session token
// =============================================================================

#[tokio::test]
async fn test_token_update_reopens_with_new_token() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector.clone());
    channel.set_session_token("old");
    channel.connect().await.unwrap();
    let mut old_peer = server.accept().await.unwrap();

    channel.update_session_token("new").await.unwrap();

    assert!(matches!(
        old_peer.next_frame().await,
        Some(SocketCommand::Close { code: CLOSE_NORMAL, .. })
    ));
    let new_peer = server.accept().await.unwrap();
    assert_eq!(new_peer.url(), "ws://chat.test/ws/chat?session_token=new");
    assert_eq!(channel.connection_state(), ConnectionState::Connected);
    assert_eq!(channel.connection_info().reconnect_attempts, 0);
    assert_eq!(connector.open_count(), 2);
}

#[tokio::test]
async fn test_token_update_while_disconnected_only_stores() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector.clone());

    channel.update_session_token("later").await.unwrap();
    assert_eq!(connector.open_count(), 0);

    channel.connect().await.unwrap();
    assert_eq!(
        server.accept().await.unwrap().url(),
        "ws://chat.test/ws/chat?session_token=later"
    );
}

// =============================================================================
// Scenario
// =============================================================================

#[tokio::test]
async fn test_chest_pain_exchange() {
    let (connector, mut server) = InMemoryConnector::pair();
    let channel = RealtimeChannel::with_connector(config(), connector);
    channel.set_session_token("S1");
    let recorder = Recorder::attach(&channel);
    channel.connect().await.unwrap();
    let mut peer = server.accept().await.unwrap();

    assert!(channel.send_text("I have chest pain"));
    let sent = peer.next_json().await.unwrap();
    assert_eq!(sent["text"], "I have chest pain");
    assert_eq!(sent["message_code"], 1011);
    assert_eq!(sent["message_type"], "text_message");

    peer.send_json(&json!({
        "type": "ai_response",
        "text": "How long have you had it?",
        "id": "srv-1"
    }));
    let mut rx = channel.watch_connection();
    peer.close(CLOSE_NORMAL);
    wait_for(&mut rx, |i| i.state == ConnectionState::Disconnected).await;

    let messages = recorder.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender(), Some(SenderRole::Assistant));
    assert_eq!(messages[0].text(), Some("How long have you had it?"));
}

#[tokio::test]
async fn test_client_reply_callback_fires_once() {
    let (connector, mut server) = InMemoryConnector::pair();
    let mut transport = TransportConfig::realtime();
    transport.realtime = config();
    let client =
        ChatClient::with_connector(&CourierConfig::default().with_transport(transport), connector)
            .unwrap();

    let replies = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&replies);
    let _sub = client.on_message(move |text| {
        if text.sender == SenderRole::Assistant {
            sink.lock().push(text.text.clone());
        }
    });

    client.set_session_token("S1");
    client.connect().await.unwrap();
    let mut peer = server.accept().await.unwrap();

    assert!(client.send_text_message("I have chest pain"));
    assert_eq!(peer.next_json().await.unwrap()["text"], "I have chest pain");
    assert!(client.send_typing_indicator("patient-1", false));

    peer.send_json(&json!({"type": "ai_response", "text": "Is the pain sharp or dull?"}));
    let mut rx = client.watch_connection();
    peer.close(CLOSE_NORMAL);
    wait_for(&mut rx, |i| i.state == ConnectionState::Disconnected).await;

    assert_eq!(*replies.lock(), vec!["Is the pain sharp or dull?".to_string()]);
}
