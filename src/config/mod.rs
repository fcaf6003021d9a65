//! Configuration module
//!
//! Handles loading and saving mediabridge configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::network::{NetworkConfig, DEFAULT_MAX_MESSAGE_SIZE};
use crate::protocol::DEFAULT_PORT;
use crate::service::{
    Capabilities, Dispatcher, LocalMediaService, DEFAULT_MAX_ACOUSTICS_ENTRIES, STREAM_MUSIC,
};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid setting: {0}")]
    Invalid(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Listener and connection settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Optional operations the dispatcher answers
    #[serde(default)]
    pub capabilities: Capabilities,

    /// Size limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Reference service settings
    #[serde(default)]
    pub service: ServiceConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on or connect to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interface to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Connection timeout in ms
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

/// Limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest frame payload accepted or sent
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Largest acoustics capacity a caller may declare
    #[serde(default = "default_max_acoustics_entries")]
    pub max_acoustics_entries: usize,
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_max_acoustics_entries() -> usize {
    DEFAULT_MAX_ACOUSTICS_ENTRIES
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            max_acoustics_entries: default_max_acoustics_entries(),
        }
    }
}

/// Reference service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Stream category reported for new players
    #[serde(default = "default_stream_type")]
    pub default_stream_type: i32,
}

fn default_stream_type() -> i32 {
    STREAM_MUSIC
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_stream_type: default_stream_type(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("mediabridge/config.toml")),
            Some(PathBuf::from("./mediabridge.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                tracing::debug!("Loading configuration from {}", path.display());
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings no dispatcher or codec could run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.limits.max_message_size == 0 {
            return Err(ConfigError::Invalid("limits.max_message_size must be positive"));
        }
        if self.limits.max_acoustics_entries == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_acoustics_entries must be positive",
            ));
        }
        if i32::try_from(self.limits.max_acoustics_entries).is_err() {
            return Err(ConfigError::Invalid(
                "limits.max_acoustics_entries must fit in an int32",
            ));
        }
        Ok(())
    }

    /// Network settings for the server and client transport
    pub fn network_config(&self) -> NetworkConfig {
        let mut config = NetworkConfig::new(self.server.port)
            .with_bind_address(self.server.bind_address.clone())
            .with_max_message_size(self.limits.max_message_size);
        config.connect_timeout_ms = self.server.connect_timeout_ms;
        config
    }

    /// Reference service configured from the `[service]` section
    pub fn build_service(&self) -> LocalMediaService {
        LocalMediaService::default().with_stream_type(self.service.default_stream_type)
    }

    /// Dispatcher over `service` with the configured capabilities and limits
    pub fn build_dispatcher(&self, service: Arc<LocalMediaService>) -> Dispatcher {
        Dispatcher::new(service, self.capabilities)
            .with_max_acoustics_entries(self.limits.max_acoustics_entries)
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        general: GeneralConfig { verbose: true },
        server: ServerConfig {
            bind_address: "0.0.0.0".to_string(),
            ..Default::default()
        },
        limits: LimitsConfig {
            max_acoustics_entries: 256,
            ..Default::default()
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}
