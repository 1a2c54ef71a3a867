//! Configuration for the packetlog server.
//!
//! The command line carries a single daemon flag; everything else comes from
//! an optional TOML file named by the `PACKETLOG_CONFIG` environment
//! variable, falling back to built-in defaults.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional TOML configuration file.
pub const CONFIG_ENV: &str = "PACKETLOG_CONFIG";

/// Command-line arguments for the journal server
#[derive(Parser, Debug)]
#[command(name = "packetlogd")]
#[command(version = "0.1.0")]
#[command(about = "A TCP packet journal server", long_about = None)]
pub struct CliArgs {
    /// Run as a daemon, detached from the controlling terminal
    #[arg(short = 'd', long)]
    pub daemon: bool,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Bounded wait used by the accept and receive polls, in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// Journal-related configuration
#[derive(Debug, Deserialize)]
pub struct JournalConfig {
    /// Path of the journal's backing file
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
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

fn default_listen() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_data_file() -> PathBuf {
    PathBuf::from("/var/tmp/packetlog.data")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub data_file: PathBuf,
    pub poll_timeout: Duration,
    pub log_level: String,
    pub daemon: bool,
}

impl Config {
    /// Load configuration from CLI args and the optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::FileRead(path.clone(), e))?;
                toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path, e))?
            }
            None => TomlConfig::default(),
        };

        Ok(Self::resolve(cli, toml_config))
    }

    fn resolve(cli: CliArgs, file: TomlConfig) -> Config {
        Config {
            listen: file.server.listen,
            data_file: file.journal.data_file,
            poll_timeout: Duration::from_millis(file.server.poll_timeout_ms),
            log_level: file.logging.level,
            daemon: cli.daemon,
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
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
        }
    }
}

impl std::error::Error for ConfigError {}
