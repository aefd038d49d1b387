//! Broker connection configuration
//!
//! Settings are resolved from three layers, highest precedence first:
//! explicit overrides (CLI flags), environment variables, and an
//! optional TOML configuration file. The broker host is required; the
//! manager refuses to construct without one.

use crate::queue::error::{QueueError, QueueResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the broker host (required)
pub const HOST_VAR: &str = "BROKER_HOST";
/// Environment variable naming the broker port (optional)
pub const PORT_VAR: &str = "BROKER_PORT";

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_CHANNEL_BACKLOG: usize = 10_000;
pub const DEFAULT_DELIVERY_ATTEMPTS: u32 = 1;

/// Resolved settings for the shared broker connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    /// Maximum envelopes a single channel holds before submissions are
    /// rejected
    pub channel_backlog: usize,
    /// Delivery attempts the store grants an envelope before it is
    /// dead-lettered
    pub max_delivery_attempts: u32,
}

impl ConnectionSettings {
    /// Settings for the given host with all other fields defaulted
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            channel_backlog: DEFAULT_CHANNEL_BACKLOG,
            max_delivery_attempts: DEFAULT_DELIVERY_ATTEMPTS,
        }
    }

    /// Resolve settings from the environment alone
    pub fn from_env() -> QueueResult<Self> {
        resolve(&Overrides::default(), &FileConfig::default())
    }
}

/// Explicit overrides that beat every other configuration source
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// TOML configuration file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub connection: ConnectionSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub channel_backlog: Option<usize>,
    pub max_delivery_attempts: Option<u32>,
}

/// Default configuration file location under the user's config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("jobq").join("config.toml"))
}

/// Load a configuration file.
///
/// A missing file is only an error when the path was given explicitly;
/// the defaulted location is allowed to be absent.
pub fn load_config_file(path: &Path, explicit: bool) -> QueueResult<FileConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).map_err(|err| QueueError::Configuration {
            message: format!("invalid config file {}: {}", path.display(), err),
        }),
        Err(_) if !explicit => Ok(FileConfig::default()),
        Err(err) => Err(QueueError::Configuration {
            message: format!("cannot read config file {}: {}", path.display(), err),
        }),
    }
}

/// Merge overrides, environment and file configuration into settings.
///
/// Fails when no layer supplies a host, or when a supplied value does
/// not parse.
pub fn resolve(overrides: &Overrides, file: &FileConfig) -> QueueResult<ConnectionSettings> {
    let host = overrides
        .host
        .clone()
        .or_else(|| env_var(HOST_VAR))
        .or_else(|| file.connection.host.clone())
        .ok_or_else(|| QueueError::Configuration {
            message: format!("{HOST_VAR} is not set and no broker host was configured"),
        })?;

    let port = match overrides.port {
        Some(port) => port,
        None => match env_var(PORT_VAR) {
            Some(raw) => raw.parse().map_err(|_| QueueError::Configuration {
                message: format!("{PORT_VAR} is not a valid port: {raw}"),
            })?,
            None => file.connection.port.unwrap_or(DEFAULT_PORT),
        },
    };

    Ok(ConnectionSettings {
        host,
        port,
        channel_backlog: file
            .connection
            .channel_backlog
            .unwrap_or(DEFAULT_CHANNEL_BACKLOG),
        max_delivery_attempts: file
            .connection
            .max_delivery_attempts
            .unwrap_or(DEFAULT_DELIVERY_ATTEMPTS),
    })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
