//! Courier - Terminal Patient Chat Client
//!
//! Resolves a session for the user, connects on the configured transport,
//! and runs a line-based conversation on the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Realtime transport against a local backend
//! courier --user-id 42 --secondary-id jhh-42
//!
//! # Offline, with canned replies
//! courier --user-id 42 --mock
//!
//! # Polling against a staging API
//! courier --user-id 42 --transport polling --api-url https://staging.example.org
//!
//! # Verbose logging
//! RUST_LOG=debug courier --user-id 42
//! ```
//!
//! Logs go to stderr; the conversation goes to stdout.

mod conversation;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use courier_core::{
    load_config_from_path, ChatClient, ConfigOverrides, CourierConfig, SessionResolver,
    TransportType,
};

use conversation::{Conversation, SessionSource};

/// Courier - terminal chat client for the patient assistant
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// User the session belongs to
    #[arg(short = 'u', long, env = "COURIER_USER_ID")]
    user_id: String,

    /// Secondary identifier sent when a session is created
    #[arg(long, env = "COURIER_SECONDARY_ID", default_value = "")]
    secondary_id: String,

    /// Device identifier (a random one is generated if omitted)
    #[arg(long, env = "COURIER_DEVICE_ID")]
    device_id: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "COURIER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// API base URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// WebSocket endpoint
    #[arg(long, value_name = "URL")]
    ws_url: Option<String>,

    /// Transport (realtime or polling)
    #[arg(short = 't', long)]
    transport: Option<TransportType>,

    /// Use the offline polling responder
    #[arg(short = 'm', long)]
    mock: bool,

    /// Connect timeout in milliseconds
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Do not reconnect after the connection drops
    #[arg(long)]
    no_reconnect: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "COURIER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(url) = &self.api_url {
            overrides = overrides.with_api_url(url.clone());
        }
        if let Some(url) = &self.ws_url {
            overrides = overrides.with_ws_url(url.clone());
        }
        if let Some(transport) = self.transport {
            overrides = overrides.with_transport(transport);
        }
        if self.mock {
            overrides = overrides.with_mock(true);
        }
        if let Some(ms) = self.connect_timeout_ms {
            overrides = overrides.with_connect_timeout_ms(ms);
        }
        if self.no_reconnect {
            overrides = overrides.with_auto_reconnect(false);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("courier={level},courier_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the file and environment layers, then apply the command line on top
fn resolve_config(args: &Args) -> Result<CourierConfig> {
    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Courier starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    info!(
        transport = %config.transport.transport,
        source = %config.source(),
        "Configuration loaded"
    );
    if let Some(path) = &config.config_file_path {
        info!(config_path = ?path, "Config file");
    }

    let sessions = if config.transport.is_polling() && config.transport.polling.mock {
        warn!("Mock mode: skipping session lookup");
        SessionSource::Offline
    } else {
        let resolver = SessionResolver::new(config.api.clone())?;
        SessionSource::Remote {
            resolver,
            user_id: args.user_id.clone(),
            secondary_id: args.secondary_id.clone(),
            device_id: args.device_id.clone(),
        }
    };

    let client = ChatClient::new(&config).context("Failed to build chat client")?;
    let mut conversation = Conversation::new(client, sessions);
    conversation.open().await?;

    let result = conversation.run().await;
    conversation.close();

    match &result {
        Ok(()) => info!("Courier stopped cleanly"),
        Err(e) => tracing::error!(error = %e, "Courier stopped with error"),
    }
    result
}
