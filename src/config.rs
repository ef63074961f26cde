//! Configuration module for the vsock connector.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::transport::PeerAddress;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the connector
#[derive(Parser, Debug)]
#[command(name = "vsock-connector")]
#[command(author = "vsock-connector authors")]
#[command(version = "0.1.0")]
#[command(about = "Relays text to an enclave over vsock", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Context id of the enclave
    #[arg(long)]
    pub cid: Option<u32>,

    /// Port the enclave listens on
    #[arg(short = 'p', long)]
    pub port: Option<u32>,

    /// Maximum number of response bytes taken from a single read
    #[arg(short = 'b', long)]
    pub receive_buffer_size: Option<usize>,

    /// Deadline for each connect, write and read in milliseconds (0 = none)
    #[arg(short = 't', long)]
    pub io_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Enclave address configuration
#[derive(Debug, Deserialize)]
pub struct PeerConfig {
    #[serde(default = "default_cid")]
    pub cid: u32,
    #[serde(default = "default_port")]
    pub port: u32,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            cid: default_cid(),
            port: default_port(),
        }
    }
}

/// Per-exchange configuration
#[derive(Debug, Deserialize)]
pub struct ExchangeConfig {
    /// Maximum response size in bytes
    #[serde(default = "default_receive_buffer_size")]
    pub receive_buffer_size: usize,
    /// Per-operation deadline in milliseconds
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: default_receive_buffer_size(),
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_cid() -> u32 {
    3
}

fn default_port() -> u32 {
    9000
}

fn default_receive_buffer_size() -> usize {
    4096
}

fn default_io_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub peer: PeerAddress,
    pub receive_buffer_size: usize,
    /// `None` means transport operations block indefinitely.
    pub io_timeout: Option<Duration>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args with TOML config and validate the result.
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let receive_buffer_size = cli
            .receive_buffer_size
            .unwrap_or(toml_config.exchange.receive_buffer_size);
        if receive_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "receive_buffer_size must be greater than zero".to_string(),
            ));
        }

        let io_timeout_ms = cli
            .io_timeout_ms
            .unwrap_or(toml_config.exchange.io_timeout_ms);

        Ok(Config {
            peer: PeerAddress::new(
                cli.cid.unwrap_or(toml_config.peer.cid),
                cli.port.unwrap_or(toml_config.peer.port),
            ),
            receive_buffer_size,
            io_timeout: (io_timeout_ms > 0).then(|| Duration::from_millis(io_timeout_ms)),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(reason) => write!(f, "Invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}
