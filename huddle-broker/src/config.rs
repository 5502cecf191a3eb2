//! Configuration system for the `Huddle` development broker.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/huddle-broker/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use huddle_proto::destination::Destinations;
use huddle_proto::stomp::HeartBeat;

use crate::broker::{BrokerOptions, DEFAULT_HEART_BEAT, DEFAULT_MAX_FRAME_SIZE};

/// Errors that can occur when loading broker configuration.
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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the broker.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BrokerConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the broker config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    heartbeat_send_ms: Option<u64>,
    heartbeat_receive_ms: Option<u64>,
    max_frame_size: Option<usize>,
    destinations: Option<Destinations>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the broker.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Huddle development STOMP broker")]
pub struct BrokerCliArgs {
    /// Address to bind the broker to.
    #[arg(short, long, env = "HUDDLE_BROKER_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/huddle-broker/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Heartbeat interval offered to clients, in milliseconds (0 disables).
    #[arg(long)]
    pub heartbeat_ms: Option<u64>,

    /// Maximum WebSocket message size in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "HUDDLE_BROKER_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:5057`).
    pub bind_addr: String,
    /// Heartbeats advertised in `CONNECTED`.
    pub heart_beat: HeartBeat,
    /// Maximum WebSocket message size in bytes.
    pub max_frame_size: usize,
    /// Topic and application destinations.
    pub destinations: Destinations,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5057".to_string(),
            heart_beat: DEFAULT_HEART_BEAT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            destinations: Destinations::default(),
            log_level: "info".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &BrokerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `BrokerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. `--heartbeat-ms` sets both directions.
    #[must_use]
    fn resolve(cli: &BrokerCliArgs, file: &BrokerConfigFile) -> Self {
        let defaults = Self::default();
        let server = &file.server;

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            heart_beat: HeartBeat {
                send_ms: cli
                    .heartbeat_ms
                    .or(server.heartbeat_send_ms)
                    .unwrap_or(defaults.heart_beat.send_ms),
                receive_ms: cli
                    .heartbeat_ms
                    .or(server.heartbeat_receive_ms)
                    .unwrap_or(defaults.heart_beat.receive_ms),
            },
            max_frame_size: cli
                .max_frame_size
                .or(server.max_frame_size)
                .unwrap_or(defaults.max_frame_size),
            destinations: server
                .destinations
                .clone()
                .unwrap_or(defaults.destinations),
            log_level: cli.log_level.clone(),
        }
    }

    /// Broker options for [`crate::broker::BrokerState::with_options`].
    #[must_use]
    pub fn options(&self) -> BrokerOptions {
        BrokerOptions {
            destinations: self.destinations.clone(),
            heart_beat: self.heart_beat,
            max_frame_size: self.max_frame_size,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the broker.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<BrokerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(BrokerConfigFile::default());
        };
        config_dir.join("huddle-broker").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BrokerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
