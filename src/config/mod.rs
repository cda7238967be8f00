mod logging_config;

pub use logging_config::LoggingConfig;

use std::collections::HashMap;
use std::path::Path;

use clap::{Parser, Subcommand};
use dimse::types::QueryLevel;
use dimse::{DimseConfig, DimseError, RemoteNode};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading configuration or parsing arguments
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid [scu] section: {0}")]
    Scu(#[source] DimseError),

    #[error("Invalid peer '{name}': {reason}")]
    InvalidPeer { name: String, reason: String },

    #[error("Unknown peer '{0}'")]
    UnknownPeer(String),
}

/// Top-level configuration file
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Local node settings
    #[serde(default)]
    pub scu: DimseConfig,

    /// Remote nodes by name
    #[serde(default)]
    pub peers: HashMap<String, RemoteNode>,
}

impl Config {
    /// Load and validate a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate a TOML configuration
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scu.validate().map_err(ConfigError::Scu)?;

        for (name, peer) in &self.peers {
            peer.validate().map_err(|e| ConfigError::InvalidPeer {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Look up a peer by name
    pub fn peer(&self, name: &str) -> Result<&RemoteNode, ConfigError> {
        self.peers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPeer(name.to_string()))
    }
}

/// Operation requested on the command line
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ScuCommand {
    /// Check that a peer answers C-ECHO
    Echo {
        /// Peer name from the [peers] table
        peer: String,
    },
    /// Query a peer with C-FIND and print the matches as JSON lines
    Find {
        peer: String,
        /// PATIENT, STUDY, SERIES or IMAGE
        #[arg(value_parser = parse_level)]
        level: QueryLevel,
        /// Matching and return keys as Key=Value (empty value returns the key)
        #[arg(value_parser = parse_key_value)]
        keys: Vec<(String, String)>,
    },
    /// Ask a peer to send matching objects to another AE with C-MOVE
    Move {
        peer: String,
        /// Destination AE title
        destination: String,
        #[arg(value_parser = parse_level)]
        level: QueryLevel,
        #[arg(value_parser = parse_key_value)]
        keys: Vec<(String, String)>,
    },
    /// Retrieve one instance with C-GET
    Get {
        peer: String,
        sop_instance_uid: String,
    },
}

/// Structure representing application startup arguments.
#[derive(Parser, Debug)]
#[command(
    name = "dimse-scu",
    about = "Send DIMSE requests to remote DICOM nodes"
)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long = "config", default_value = "dimse-scu.toml")]
    pub config_path: String,

    #[command(subcommand)]
    pub command: ScuCommand,
}

fn parse_level(level: &str) -> Result<QueryLevel, String> {
    level.parse().map_err(|e: DimseError| e.to_string())
}

fn parse_key_value(key: &str) -> Result<(String, String), String> {
    match key.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("query key '{}' must look like Key=Value", key)),
    }
}
