//! Relay configuration
//!
//! Settings come from an optional TOML file; every field has a default so an
//! empty file (or no file) yields a working relay on port 41234.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::Framing;

/// Default UDP port of the relay
pub const DEFAULT_UDP_PORT: u16 = 41234;

/// Default port of the session id service
pub const DEFAULT_IDENTITY_PORT: u16 = 8080;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// UDP address the relay listens on
    #[serde(default = "default_udp_bind")]
    pub udp_bind: SocketAddr,

    /// Whether to run the session id service
    #[serde(default = "default_true")]
    pub identity_enabled: bool,

    /// Websocket address of the session id service
    #[serde(default = "default_identity_bind")]
    pub identity_bind: SocketAddr,

    /// Framing variant expected on the relay socket
    #[serde(default)]
    pub framing: Framing,

    /// Whether relayed payloads are appended to `audio_output`
    #[serde(default = "default_true")]
    pub record_audio: bool,

    /// File receiving every relayed payload
    #[serde(default = "default_audio_output")]
    pub audio_output: PathBuf,

    /// CSV file receiving one line per disconnect
    #[serde(default = "default_stats_output")]
    pub stats_output: PathBuf,

    /// Seconds between periodic stats log lines
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// PEM certificate for the session id service (enables wss://)
    #[serde(default)]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for the session id service
    #[serde(default)]
    pub tls_key: Option<PathBuf>,
}

fn default_udp_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_UDP_PORT))
}

fn default_identity_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_IDENTITY_PORT))
}

fn default_audio_output() -> PathBuf {
    PathBuf::from("output.pcm")
}

fn default_true() -> bool {
    true
}

fn default_stats_output() -> PathBuf {
    PathBuf::from("client_stats.csv")
}

fn default_stats_interval() -> u64 {
    60
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            udp_bind: default_udp_bind(),
            identity_enabled: true,
            identity_bind: default_identity_bind(),
            framing: Framing::default(),
            record_audio: true,
            audio_output: default_audio_output(),
            stats_output: default_stats_output(),
            stats_interval_secs: default_stats_interval(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl RelayConfig {
    /// Load and validate a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stats_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "stats_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(ConfigError::Invalid(
                "tls_cert and tls_key must be provided together".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the session id service should run behind TLS
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }
}
