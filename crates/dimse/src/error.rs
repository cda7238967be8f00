//! Error types for DIMSE operations

use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur during DIMSE operations
#[derive(Error, Debug)]
pub enum DimseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// The peer did not complete the TCP handshake within the connect timeout
    #[error("Couldn't connect to {peer} within {timeout_ms} ms")]
    ConnectTimeout { peer: String, timeout_ms: u64 },

    /// Name resolution or transport failure while connecting
    #[error("Could not connect to {peer}: {source}")]
    Connect {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    /// The configured local endpoint could not be bound (force-port mode)
    #[error("Local endpoint {addr} is not usable: {source}")]
    LocalBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Send failed: {0}")]
    Send(String),

    /// Connect or send failed before any response could be awaited
    #[error("Could not deliver request to remote endpoint {peer}: {source}")]
    Delivery {
        peer: String,
        #[source]
        source: Box<DimseError>,
    },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Invalid AE Title: {0}")]
    InvalidAeTitle(String),
}

impl DimseError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new dispatch error
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Wrap a connection-phase failure as a delivery failure for `peer`
    pub fn delivery(peer: impl ToString, source: DimseError) -> Self {
        Self::Delivery {
            peer: peer.to_string(),
            source: Box::new(source),
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            DimseError::Network(_)
            | DimseError::ConnectTimeout { .. }
            | DimseError::Connect { .. }
            | DimseError::ConnectionLost(_) => true,
            DimseError::Delivery { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}
