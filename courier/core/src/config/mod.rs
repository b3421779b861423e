//! TOML Configuration File Support
//!
//! Centralized configuration loading for the chat core, supporting a TOML
//! configuration file at `~/.config/courier/courier.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`COURIER_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! The transport kind is read here once; a [`crate::ChatClient`] built from the
//! resulting [`CourierConfig`] keeps it for its whole lifetime.
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "https://api.example.org"
//! request_timeout_ms = 15000
//! client_type = "mobile"
//!
//! [transport]
//! kind = "realtime"
//! auto_connect = true
//!
//! [realtime]
//! url = "wss://api.example.org/ws/chat"
//! connect_timeout_ms = 10000
//! keepalive_interval_ms = 30000
//! reconnect_delay_ms = 3000
//! max_reconnect_attempts = 5
//!
//! [polling]
//! poll_interval_ms = 2000
//! mock = false
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ChatError;
use crate::session::ClientType;
use crate::transport::config::{TransportConfig, TransportType};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// HTTP API Settings
// =============================================================================

/// Settings shared by every HTTP call (session lookup, polling)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the chat API
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout_ms: u64,

    /// Client type reported when creating sessions
    pub client_type: ClientType,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 15_000,
            client_type: ClientType::Mobile,
        }
    }
}

impl ApiConfig {
    /// Create settings for a base URL
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Per-request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Full URL of an API path
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Build the HTTP client used for every call against this API
    ///
    /// # Errors
    ///
    /// Returns `UNEXPECTED_ERROR` if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> Result<reqwest::Client, ChatError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()
            .map_err(|e| ChatError::Unexpected(format!("Failed to build HTTP client: {e}")))
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// API section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Base URL of the chat API
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: Option<u64>,

    /// `mobile` or `web`
    pub client_type: Option<String>,
}

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// `realtime` or `polling`
    pub kind: Option<String>,

    /// Connect as soon as a token is available
    pub auto_connect: Option<bool>,
}

/// Realtime section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeToml {
    /// WebSocket endpoint
    pub url: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Keep-alive interval in milliseconds
    pub keepalive_interval_ms: Option<u64>,

    /// Delay between reconnection attempts in milliseconds
    pub reconnect_delay_ms: Option<u64>,

    /// Number of reconnection attempts
    pub max_reconnect_attempts: Option<u32>,

    /// Whether to reconnect after an unclean close
    pub auto_reconnect: Option<bool>,
}

/// Polling section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingToml {
    /// Delay between polls in milliseconds
    pub poll_interval_ms: Option<u64>,

    /// Polls without a reply before giving up
    pub max_polls_per_reply: Option<u32>,

    /// Serve canned replies instead of calling the API
    pub mock: Option<bool>,

    /// Simulated mock send latency in milliseconds
    pub mock_send_delay_ms: Option<u64>,

    /// Simulated mock poll latency in milliseconds
    pub mock_poll_delay_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierToml {
    /// API configuration section
    pub api: ApiToml,

    /// Transport selection section
    pub transport: TransportToml,

    /// Realtime channel section
    pub realtime: RealtimeToml,

    /// Polling channel section
    pub polling: PollingToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Effective configuration of the chat core
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug, Default)]
pub struct CourierConfig {
    /// HTTP API settings
    pub api: ApiConfig,

    /// Transport selection and tuning
    pub transport: TransportConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl CourierConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with the given transport settings
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Configuration against the given API
    #[must_use]
    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check the configuration for values the transports cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a zero keep-alive or poll
    /// interval, or an unparseable URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::ValidationError(format!("api.base_url '{}': {e}", self.api.base_url))
        })?;
        Url::parse(&self.transport.realtime.url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "realtime.url '{}': {e}",
                self.transport.realtime.url
            ))
        })?;
        if self.transport.realtime.keepalive_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "realtime.keepalive_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.transport.polling.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "polling.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/courier/courier.toml` or
/// `~/.config/courier/courier.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("courier").join("courier.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if a
/// value fails validation. A missing config file is not an error.
pub fn load_config() -> Result<CourierConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CourierConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment variables through `env`
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<CourierConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = CourierConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CourierToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    tracing::debug!(
        transport = %config.transport.transport,
        source = %config.source,
        "Configuration resolved"
    );
    Ok(config)
}

fn parse_transport(value: &str) -> Result<TransportType, ConfigError> {
    value.parse().map_err(ConfigError::ValidationError)
}

fn parse_client_type(value: &str) -> Result<ClientType, ConfigError> {
    value.parse().map_err(ConfigError::ValidationError)
}

fn parse_flag(value: &str) -> bool {
    value != "0" && value.to_lowercase() != "false"
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut CourierConfig, toml: &CourierToml) -> Result<(), ConfigError> {
    // API settings
    if let Some(ref url) = toml.api.base_url {
        config.api.base_url = url.clone();
    }
    if let Some(timeout) = toml.api.request_timeout_ms {
        config.api.request_timeout_ms = timeout;
    }
    if let Some(ref client_type) = toml.api.client_type {
        config.api.client_type = parse_client_type(client_type)?;
    }

    // Transport selection
    if let Some(ref kind) = toml.transport.kind {
        config.transport.transport = parse_transport(kind)?;
    }
    if let Some(auto_connect) = toml.transport.auto_connect {
        config.transport.auto_connect = auto_connect;
    }

    // Realtime settings
    let realtime = &mut config.transport.realtime;
    if let Some(ref url) = toml.realtime.url {
        realtime.url = url.clone();
    }
    if let Some(timeout) = toml.realtime.connect_timeout_ms {
        realtime.connect_timeout_ms = timeout;
    }
    if let Some(interval) = toml.realtime.keepalive_interval_ms {
        realtime.keepalive_interval_ms = interval;
    }
    if let Some(delay) = toml.realtime.reconnect_delay_ms {
        realtime.reconnect_delay_ms = delay;
    }
    if let Some(attempts) = toml.realtime.max_reconnect_attempts {
        realtime.max_reconnect_attempts = attempts;
    }
    if let Some(enabled) = toml.realtime.auto_reconnect {
        realtime.auto_reconnect = enabled;
    }

    // Polling settings
    let polling = &mut config.transport.polling;
    if let Some(interval) = toml.polling.poll_interval_ms {
        polling.poll_interval_ms = interval;
    }
    if let Some(max) = toml.polling.max_polls_per_reply {
        polling.max_polls_per_reply = max;
    }
    if let Some(mock) = toml.polling.mock {
        polling.mock = mock;
    }
    if let Some(delay) = toml.polling.mock_send_delay_ms {
        polling.mock_send_delay_ms = delay;
    }
    if let Some(delay) = toml.polling.mock_poll_delay_ms {
        polling.mock_poll_delay_ms = delay;
    }

    Ok(())
}

/// Apply environment variable overrides to the config
///
/// Unparseable values are logged and ignored.
fn apply_env_config<F>(config: &mut CourierConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn number<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
        let parsed = raw.parse::<T>().ok();
        if parsed.is_none() {
            tracing::warn!(key, value = raw, "Ignoring unparseable environment value");
        }
        parsed
    }

    if let Some(url) = env("COURIER_API_URL") {
        config.api.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("COURIER_WS_URL") {
        config.transport.realtime.url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(kind) = env("COURIER_TRANSPORT") {
        match kind.parse::<TransportType>() {
            Ok(transport) => {
                config.transport.transport = transport;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring COURIER_TRANSPORT"),
        }
    }
    if let Some(ms) = env("COURIER_CONNECT_TIMEOUT").and_then(|v| number("COURIER_CONNECT_TIMEOUT", &v)) {
        config.transport.realtime.connect_timeout_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) =
        env("COURIER_KEEPALIVE_INTERVAL").and_then(|v| number("COURIER_KEEPALIVE_INTERVAL", &v))
    {
        config.transport.realtime.keepalive_interval_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env("COURIER_RECONNECT_DELAY").and_then(|v| number("COURIER_RECONNECT_DELAY", &v)) {
        config.transport.realtime.reconnect_delay_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(n) =
        env("COURIER_RECONNECT_ATTEMPTS").and_then(|v| number("COURIER_RECONNECT_ATTEMPTS", &v))
    {
        config.transport.realtime.max_reconnect_attempts = n;
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = env("COURIER_AUTO_RECONNECT") {
        config.transport.realtime.auto_reconnect = parse_flag(&enabled);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env("COURIER_POLL_INTERVAL").and_then(|v| number("COURIER_POLL_INTERVAL", &v)) {
        config.transport.polling.poll_interval_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(mock) = env("COURIER_POLLING_MOCK") {
        config.transport.polling.mock = parse_flag(&mock);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides,
/// then call [`CourierConfig::validate`] again.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// API base URL override
    pub api_url: Option<String>,

    /// WebSocket endpoint override
    pub ws_url: Option<String>,

    /// Transport kind override
    pub transport: Option<TransportType>,

    /// Polling mock mode override
    pub mock: Option<bool>,

    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,

    /// Auto-reconnect override
    pub auto_reconnect: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API base URL override
    #[must_use]
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = Some(url);
        self
    }

    /// Set WebSocket endpoint override
    #[must_use]
    pub fn with_ws_url(mut self, url: String) -> Self {
        self.ws_url = Some(url);
        self
    }

    /// Set transport kind override
    #[must_use]
    pub fn with_transport(mut self, transport: TransportType) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set polling mock mode override
    #[must_use]
    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = Some(mock);
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Set auto-reconnect override
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    fn is_empty(&self) -> bool {
        self.api_url.is_none()
            && self.ws_url.is_none()
            && self.transport.is_none()
            && self.mock.is_none()
            && self.connect_timeout_ms.is_none()
            && self.auto_reconnect.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CourierConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.api_url {
            config.api.base_url = url.clone();
        }
        if let Some(ref url) = self.ws_url {
            config.transport.realtime.url = url.clone();
        }
        if let Some(transport) = self.transport {
            config.transport.transport = transport;
        }
        if let Some(mock) = self.mock {
            config.transport.polling.mock = mock;
            // Mock mode only exists on the polling transport
            if mock {
                config.transport.transport = TransportType::Polling;
            }
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.transport.realtime.connect_timeout_ms = timeout;
        }
        if let Some(enabled) = self.auto_reconnect {
            config.transport.realtime.auto_reconnect = enabled;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = CourierConfig::default();

        assert_eq!(config.transport.transport, TransportType::Realtime);
        assert_eq!(config.transport.realtime.connect_timeout_ms, 10_000);
        assert_eq!(config.transport.realtime.keepalive_interval_ms, 30_000);
        assert_eq!(config.transport.realtime.reconnect_delay_ms, 3_000);
        assert_eq!(config.transport.realtime.max_reconnect_attempts, 5);
        assert_eq!(config.transport.polling.poll_interval_ms, 2_000);
        assert_eq!(config.transport.polling.max_polls_per_reply, 30);
        assert_eq!(config.api.client_type, ClientType::Mobile);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("courier"));
            assert!(p.to_string_lossy().ends_with("courier.toml"));
        }
    }

    #[test]
    fn test_api_endpoint_joins_paths() {
        let api = ApiConfig::new("https://api.example.org/");
        assert_eq!(api.endpoint("/session"), "https://api.example.org/session");
        assert_eq!(api.endpoint("messages"), "https://api.example.org/messages");
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[api]
base_url = "https://api.example.org"
request_timeout_ms = 5000
client_type = "web"

[transport]
kind = "polling"
auto_connect = true

[realtime]
url = "wss://api.example.org/ws/chat"
connect_timeout_ms = 4000
keepalive_interval_ms = 15000
reconnect_delay_ms = 1000
max_reconnect_attempts = 8
auto_reconnect = false

[polling]
poll_interval_ms = 500
max_polls_per_reply = 10
mock = true
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.api.base_url, "https://api.example.org");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.api.client_type, ClientType::Web);
        assert!(config.transport.is_polling());
        assert!(config.transport.auto_connect);
        assert_eq!(config.transport.realtime.url, "wss://api.example.org/ws/chat");
        assert_eq!(config.transport.realtime.connect_timeout_ms, 4000);
        assert_eq!(config.transport.realtime.keepalive_interval_ms, 15000);
        assert_eq!(config.transport.realtime.reconnect_delay_ms, 1000);
        assert_eq!(config.transport.realtime.max_reconnect_attempts, 8);
        assert!(!config.transport.realtime.auto_reconnect);
        assert_eq!(config.transport.polling.poll_interval_ms, 500);
        assert_eq!(config.transport.polling.max_polls_per_reply, 10);
        assert!(config.transport.polling.mock);
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_partial_toml() {
        let file = write_toml(
            r#"
[realtime]
max_reconnect_attempts = 2
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.transport.realtime.max_reconnect_attempts, 2);
        assert_eq!(config.transport.realtime.reconnect_delay_ms, 3_000);
        assert!(config.transport.is_realtime());
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/path/courier.toml");
        let config = load_config_with_env(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_toml(
            r#"
[realtime
connect_timeout_ms = "not a number"
"#,
        );

        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_unknown_transport_kind_rejected() {
        let file = write_toml("[transport]\nkind = \"smoke-signals\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_keepalive_rejected() {
        let file = write_toml("[realtime]\nkeepalive_interval_ms = 0\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let file = write_toml("[api]\nbase_url = \"not a url\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    // =========================================================================
    // Priority Ordering Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml(
            r#"
[transport]
kind = "realtime"

[realtime]
connect_timeout_ms = 5000
"#,
        );

        let env = env_from(&[
            ("COURIER_TRANSPORT", "polling"),
            ("COURIER_CONNECT_TIMEOUT", "3000"),
            ("COURIER_POLLING_MOCK", "1"),
            ("COURIER_AUTO_RECONNECT", "false"),
        ]);
        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

        assert!(config.transport.is_polling());
        assert_eq!(config.transport.realtime.connect_timeout_ms, 3000);
        assert!(config.transport.polling.mock);
        assert!(!config.transport.realtime.auto_reconnect);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_unparseable_env_ignored() {
        let env = env_from(&[("COURIER_RECONNECT_ATTEMPTS", "many")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.transport.realtime.max_reconnect_attempts, 5);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = env_from(&[("COURIER_WS_URL", "wss://env.example.org/ws/chat")]);
        let mut config = load_config_with_env(None, env).unwrap();

        ConfigOverrides::new()
            .with_ws_url("wss://cli.example.org/ws/chat".to_string())
            .with_connect_timeout_ms(1234)
            .apply(&mut config);

        assert_eq!(config.transport.realtime.url, "wss://cli.example.org/ws/chat");
        assert_eq!(config.transport.realtime.connect_timeout_ms, 1234);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_mock_override_selects_polling() {
        let mut config = CourierConfig::default();
        ConfigOverrides::new().with_mock(true).apply(&mut config);
        assert!(config.transport.is_polling());
        assert!(config.transport.polling.mock);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = CourierConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
