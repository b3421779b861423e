//! Line-based conversation loop
//!
//! Reads user lines from stdin and prints whatever the chat client delivers.
//! Lines starting with `/` are commands:
//!
//! - `/status` prints the connection state
//! - `/quit` ends the conversation

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use courier_core::{
    ChatClient, ChatEvent, ConnectionInfo, ConnectionState, NormalizedMessage, SenderRole,
    Session, SessionResolver, Subscription,
};

/// Token used when no backend is involved
const OFFLINE_TOKEN: &str = "offline-session";

/// Where session tokens come from
pub enum SessionSource {
    /// Mock mode; any token will do
    Offline,
    /// Resolved against the session API
    Remote {
        resolver: SessionResolver,
        user_id: String,
        secondary_id: String,
        device_id: Option<String>,
    },
}

/// What a line of input asks for
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Say(&'a str),
    Status,
    Quit,
    Empty,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    match line {
        "" => Command::Empty,
        "/quit" | "/exit" => Command::Quit,
        "/status" => Command::Status,
        _ if line.starts_with('/') => Command::Unknown(line),
        _ => Command::Say(line),
    }
}

/// Terminal line for an event, if it is worth showing
fn render(event: &ChatEvent) -> Option<String> {
    match event {
        ChatEvent::Message(NormalizedMessage::Text(text)) => match text.sender {
            SenderRole::Assistant => Some(format!("assistant> {}", text.text)),
            // Echoes of our own input
            SenderRole::User => None,
        },
        ChatEvent::Message(NormalizedMessage::Typing(typing)) => typing
            .is_typing
            .then(|| format!("[{} is typing]", typing.user_id)),
        ChatEvent::Message(NormalizedMessage::ConsultationOffer(offer)) => Some(format!(
            "[consultation offered{}]",
            offer
                .conversation_id
                .as_deref()
                .map(|id| format!(" for conversation {id}"))
                .unwrap_or_default()
        )),
        ChatEvent::Message(NormalizedMessage::Error(info)) | ChatEvent::Error(info) => {
            Some(format!("[error {}: {}]", info.code, info.message))
        }
        ChatEvent::ConnectionChanged(info) => match info.state {
            ConnectionState::Reconnecting if info.reconnect_attempts == 0 => {
                Some("[connection lost, reconnecting]".to_string())
            }
            ConnectionState::Reconnecting => Some(format!(
                "[reconnecting (attempt {})]",
                info.reconnect_attempts
            )),
            ConnectionState::Connected | ConnectionState::Disconnected => {
                Some(format!("[{}]", info.state))
            }
            ConnectionState::Connecting | ConnectionState::Error => None,
        },
    }
}

fn describe(info: &ConnectionInfo) -> String {
    let mut line = format!("state: {}, reconnect attempts: {}", info.state, info.reconnect_attempts);
    if let Some(at) = info.last_connected_at {
        line.push_str(&format!(", connected at {}", at.to_rfc3339()));
    }
    if let Some(error) = &info.error {
        line.push_str(&format!(", last error: {error}"));
    }
    line
}

/// A running terminal conversation
pub struct Conversation {
    client: ChatClient,
    sessions: SessionSource,
    session: Option<Session>,
    _printer: Subscription,
}

impl Conversation {
    /// Wrap a client; nothing is sent until [`Self::open`]
    pub fn new(client: ChatClient, sessions: SessionSource) -> Self {
        // A failed retry republishes the same attempt with its error
        let last_status = Mutex::new(None::<String>);
        let printer = client.subscribe(move |event| {
            let Some(line) = render(event) else {
                return;
            };
            if let ChatEvent::ConnectionChanged(_) = event {
                let mut last = last_status.lock();
                if last.as_deref() == Some(line.as_str()) {
                    return;
                }
                *last = Some(line.clone());
            }
            println!("{line}");
        });

        Self {
            client,
            sessions,
            session: None,
            _printer: printer,
        }
    }

    /// Obtain a session and connect
    pub async fn open(&mut self) -> Result<()> {
        let token = self.obtain_token().await?;
        self.client.set_session_token(token);
        self.client
            .connect()
            .await
            .context("Failed to connect to the chat backend")?;
        println!("Connected over {}. Type /quit to leave.", self.client.transport_kind());
        Ok(())
    }

    /// Run until stdin closes, the user quits, or the connection is lost for good
    pub async fn run(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut connection = self.client.connection_stream();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read stdin")? else {
                        debug!("stdin closed");
                        break;
                    };
                    match parse_command(&line) {
                        Command::Quit => break,
                        Command::Empty => {}
                        Command::Status => println!("{}", describe(&self.client.connection_info())),
                        Command::Unknown(cmd) => println!("unknown command {cmd}"),
                        Command::Say(text) => self.say(text).await?,
                    }
                }
                Some(info) = connection.next() => {
                    if info.is_terminal_failure() {
                        warn!(error = ?info.error, "Connection lost for good");
                        println!("Connection lost. Giving up.");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Disconnect; safe to call more than once
    pub fn close(&self) {
        self.client.disconnect();
    }

    async fn say(&mut self, text: &str) -> Result<()> {
        self.refresh_if_expired().await?;
        if !self.client.send_text_message(text) {
            println!("[not sent: {}]", self.client.connection_state());
        }
        Ok(())
    }

    async fn refresh_if_expired(&mut self) -> Result<()> {
        let expired = self
            .session
            .as_ref()
            .is_some_and(|session| session.is_expired(Utc::now()));
        if expired {
            info!("Session expired, resolving a new one");
            let token = self.obtain_token().await?;
            self.client
                .update_session_token(token)
                .await
                .context("Failed to reconnect with the new session")?;
        }
        Ok(())
    }

    async fn obtain_token(&mut self) -> Result<String> {
        match &self.sessions {
            SessionSource::Offline => Ok(OFFLINE_TOKEN.to_string()),
            SessionSource::Remote {
                resolver,
                user_id,
                secondary_id,
                device_id,
            } => {
                let resolved = resolver
                    .get_or_create_session(user_id, secondary_id, device_id.as_deref())
                    .await
                    .context("Failed to resolve a session")?;
                info!(
                    session_id = %resolved.session.session_id,
                    is_new = resolved.is_new,
                    "Session resolved"
                );
                let token = resolved.session.session_token.clone();
                self.session = Some(resolved.session);
                Ok(token)
            }
        }
    }
}
