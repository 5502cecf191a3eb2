//! Configuration system for the Huddle client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/huddle/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use huddle_proto::destination::Destinations;
use huddle_proto::stomp::HeartBeat;

use crate::chat::ChatOptions;
use crate::chat::delivery::SimulatedReceipts;
use crate::transport::stomp::StompConfig;

/// Broker endpoint used when nothing else is configured.
pub const DEFAULT_BROKER_URL: &str = "ws://localhost:5057/Coaching-service/ws/chat/websocket";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The broker URL is not a usable WebSocket URL.
    #[error("invalid broker url {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    chat: ChatFileConfig,
    ui: UiFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    broker_url: Option<String>,
    identity: Option<String>,
    reconnect_delay_ms: Option<u64>,
    heartbeat_send_ms: Option<u64>,
    heartbeat_receive_ms: Option<u64>,
    connect_timeout_secs: Option<u64>,
    destinations: Option<Destinations>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    sent_after_ms: Option<u64>,
    seen_after_ms: Option<u64>,
    typing_timeout_ms: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    poll_timeout_ms: Option<u64>,
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Chat layer timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Delay before an own message is shown as sent.
    pub sent_after: Duration,
    /// Further delay before it is shown as seen.
    pub seen_after: Duration,
    /// Idle period after which the typing indicator clears.
    pub typing_timeout: Duration,
    /// Capacity of each event bus.
    pub event_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            sent_after: Duration::from_millis(500),
            seen_after: Duration::from_millis(1500),
            typing_timeout: Duration::from_secs(3),
            event_buffer: 256,
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Network --
    /// Broker WebSocket URL.
    pub broker_url: String,
    /// Name to pre-fill at the join prompt.
    pub identity: Option<String>,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Heartbeats advertised to the broker.
    pub heart_beat: HeartBeat,
    /// Timeout for the WebSocket + STOMP handshake.
    pub connect_timeout: Duration,
    /// Topic and application destinations.
    pub destinations: Destinations,

    // -- Chat --
    pub chat: ChatConfig,

    // -- UI --
    /// Poll timeout for the TUI event loop.
    pub poll_timeout: Duration,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            identity: None,
            reconnect_delay: Duration::from_secs(5),
            heart_beat: HeartBeat::new(Duration::from_secs(4), Duration::from_secs(4)),
            connect_timeout: Duration::from_secs(10),
            destinations: Destinations::default(),
            chat: ChatConfig::default(),
            poll_timeout: Duration::from_millis(50),
            timestamp_format: "%H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the resulting broker URL is not a ws:// or wss://
    /// URL.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        validate_broker_url(&config.broker_url)?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let network = &file.network;

        Self {
            broker_url: cli
                .broker_url
                .clone()
                .or_else(|| network.broker_url.clone())
                .unwrap_or(defaults.broker_url),
            identity: cli.identity.clone().or_else(|| network.identity.clone()),
            reconnect_delay: network
                .reconnect_delay_ms
                .map_or(defaults.reconnect_delay, Duration::from_millis),
            heart_beat: HeartBeat {
                send_ms: network
                    .heartbeat_send_ms
                    .unwrap_or(defaults.heart_beat.send_ms),
                receive_ms: network
                    .heartbeat_receive_ms
                    .unwrap_or(defaults.heart_beat.receive_ms),
            },
            connect_timeout: network
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            destinations: network
                .destinations
                .clone()
                .unwrap_or(defaults.destinations),
            chat: ChatConfig {
                sent_after: file
                    .chat
                    .sent_after_ms
                    .map_or(defaults.chat.sent_after, Duration::from_millis),
                seen_after: file
                    .chat
                    .seen_after_ms
                    .map_or(defaults.chat.seen_after, Duration::from_millis),
                typing_timeout: file
                    .chat
                    .typing_timeout_ms
                    .map_or(defaults.chat.typing_timeout, Duration::from_millis),
                event_buffer: file
                    .chat
                    .event_buffer
                    .unwrap_or(defaults.chat.event_buffer),
            },
            poll_timeout: file
                .ui
                .poll_timeout_ms
                .map_or(defaults.poll_timeout, Duration::from_millis),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Settings for the STOMP transport.
    #[must_use]
    pub fn stomp_config(&self) -> StompConfig {
        StompConfig {
            url: self.broker_url.clone(),
            topic: self.destinations.topic.clone(),
            heart_beat: self.heart_beat,
            reconnect_delay: self.reconnect_delay,
            connect_timeout: self.connect_timeout,
        }
    }

    /// Options for the chat layer.
    #[must_use]
    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            destinations: self.destinations.clone(),
            typing_timeout: self.chat.typing_timeout,
            event_capacity: self.chat.event_buffer,
        }
    }

    /// The simulated read-receipt tracker with the configured delays.
    #[must_use]
    pub const fn receipts(&self) -> SimulatedReceipts {
        SimulatedReceipts::new(self.chat.sent_after, self.chat.seen_after)
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Presence-aware terminal chat over STOMP")]
pub struct CliArgs {
    /// WebSocket URL of the STOMP broker.
    #[arg(long, env = "HUDDLE_BROKER_URL")]
    pub broker_url: Option<String>,

    /// Name to pre-fill at the join prompt.
    #[arg(long, env = "HUDDLE_IDENTITY")]
    pub identity: Option<String>,

    /// Path to config file (default: `~/.config/huddle/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "HUDDLE_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/huddle.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("huddle").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

/// Accepts only absolute ws:// or wss:// URLs with a host.
fn validate_broker_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = url::Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(invalid("scheme must be ws or wss"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_client() {
        let config = ClientConfig::default();
        assert_eq!(config.broker_url, DEFAULT_BROKER_URL);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.heart_beat.send_ms, 4000);
        assert_eq!(config.heart_beat.receive_ms, 4000);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.destinations, Destinations::default());
        assert_eq!(config.chat.sent_after, Duration::from_millis(500));
        assert_eq!(config.chat.seen_after, Duration::from_millis(1500));
        assert_eq!(config.chat.typing_timeout, Duration::from_secs(3));
        assert_eq!(config.poll_timeout, Duration::from_millis(50));
        assert_eq!(config.timestamp_format, "%H:%M");
    }

    #[test]
    fn toml_parsing_full() {
        let toml_str = r#"
[network]
broker_url = "wss://chat.example.com/ws"
identity = "alice"
reconnect_delay_ms = 2000
heartbeat_send_ms = 10000
heartbeat_receive_ms = 0
connect_timeout_secs = 30

[network.destinations]
topic = "/topic/lobby"
users = "/app/lobby/users"

[chat]
sent_after_ms = 100
seen_after_ms = 200
typing_timeout_ms = 5000
event_buffer = 64

[ui]
poll_timeout_ms = 100
timestamp_format = "%H:%M:%S"
"#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let config = ClientConfig::resolve(&CliArgs::default(), &file);

        assert_eq!(config.broker_url, "wss://chat.example.com/ws");
        assert_eq!(config.identity.as_deref(), Some("alice"));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.heart_beat.send_ms, 10_000);
        assert_eq!(config.heart_beat.receive_ms, 0);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.destinations.topic, "/topic/lobby");
        assert_eq!(config.destinations.users, "/app/lobby/users");
        // Unset destinations keep their defaults.
        assert_eq!(config.destinations.chat, "/app/chat");
        assert_eq!(config.chat.sent_after, Duration::from_millis(100));
        assert_eq!(config.chat.seen_after, Duration::from_millis(200));
        assert_eq!(config.chat.typing_timeout, Duration::from_secs(5));
        assert_eq!(config.chat.event_buffer, 64);
        assert_eq!(config.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.timestamp_format, "%H:%M:%S");
    }

    #[test]
    fn toml_parsing_empty() {
        let file: ConfigFile = toml::from_str("").unwrap();
        let config = ClientConfig::resolve(&CliArgs::default(), &file);
        assert_eq!(config.broker_url, DEFAULT_BROKER_URL);
        assert!(config.identity.is_none());
    }

    #[test]
    fn cli_overrides_file() {
        let toml_str = r#"
[network]
broker_url = "ws://file:5057/ws"
identity = "file-user"

[ui]
timestamp_format = "%H:%M:%S"
"#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let cli = CliArgs {
            broker_url: Some("ws://cli:5057/ws".to_string()),
            timestamp_format: Some("%H.%M".to_string()),
            ..Default::default()
        };
        let config = ClientConfig::resolve(&cli, &file);

        assert_eq!(config.broker_url, "ws://cli:5057/ws");
        assert_eq!(config.identity.as_deref(), Some("file-user"));
        assert_eq!(config.timestamp_format, "%H.%M");
    }

    #[test]
    fn derived_settings_follow_config() {
        let mut config = ClientConfig::default();
        config.destinations.topic = "/topic/other".to_string();
        config.chat.typing_timeout = Duration::from_secs(9);

        let stomp = config.stomp_config();
        assert_eq!(stomp.topic, "/topic/other");
        assert_eq!(stomp.reconnect_delay, Duration::from_secs(5));

        let options = config.chat_options();
        assert_eq!(options.typing_timeout, Duration::from_secs(9));
        assert_eq!(options.destinations.topic, "/topic/other");
    }

    #[test]
    fn broker_url_validation() {
        assert!(validate_broker_url("ws://localhost:5057/ws").is_ok());
        assert!(validate_broker_url("wss://chat.example.com/ws").is_ok());
        assert!(matches!(
            validate_broker_url("http://localhost/ws"),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_broker_url("not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = load_config_file(None);
        assert!(result.is_ok());
    }

    #[test]
    fn explicit_missing_config_file_returns_error() {
        let result = load_config_file(Some(std::path::Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let result: Result<ConfigFile, _> = toml::from_str("[network\nbroker_url = 1");
        assert!(result.is_err());
    }
}
