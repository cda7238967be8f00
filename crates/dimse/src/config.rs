//! Configuration types for the DIMSE SCU

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{DimseError, Result};
use crate::DEFAULT_DIMSE_PORT;

/// Maximum length of an Application Entity Title
pub const MAX_AE_TITLE_LEN: usize = 16;

/// Configuration of the local (calling) node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseConfig {
    /// Local Application Entity Title
    #[serde(default = "default_local_aet")]
    pub local_aet: String,

    /// Local address to bind outbound connections to (force-port mode)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Local port to bind outbound connections to (force-port mode, 0 = any)
    #[serde(default)]
    pub port: u16,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Idle timeout in milliseconds: how long an exchange waits for the next response
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// Always connect from `bind_addr:port`
    #[serde(default)]
    pub force_local_port: bool,

    /// Per-exchange response buffer
    #[serde(default = "default_dispatch_buffer")]
    pub dispatch_buffer: usize,
}

/// A remote DICOM node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Remote Application Entity Title
    pub ae_title: String,

    /// Remote host address
    pub host: String,

    /// Remote port
    #[serde(default = "default_remote_port")]
    pub port: u16,

    /// Connection timeout in milliseconds (overrides global setting)
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

impl Default for DimseConfig {
    fn default() -> Self {
        Self {
            local_aet: default_local_aet(),
            bind_addr: default_bind_addr(),
            port: 0,
            connect_timeout_ms: default_connect_timeout(),
            idle_timeout_ms: default_idle_timeout(),
            force_local_port: false,
            dispatch_buffer: default_dispatch_buffer(),
        }
    }
}

impl DimseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout_ms = timeout.as_millis() as u64;
    }

    pub fn set_idle_timeout(&mut self, timeout: Duration) {
        self.idle_timeout_ms = timeout.as_millis() as u64;
    }

    /// Local endpoint used when forcing the outbound port
    pub fn local_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_ae_title(&self.local_aet)?;

        if self.force_local_port && self.port == 0 {
            return Err(DimseError::config(
                "force_local_port requires a non-zero local port",
            ));
        }

        if self.dispatch_buffer == 0 {
            return Err(DimseError::config("dispatch_buffer must be greater than 0"));
        }

        Ok(())
    }
}

impl RemoteNode {
    /// Create a new remote node configuration
    pub fn new(ae_title: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            ae_title: ae_title.into(),
            host: host.into(),
            port,
            connect_timeout_ms: None,
        }
    }

    /// Set connection timeout for this node
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = Some(timeout_ms);
        self
    }

    /// `host:port`, as handed to the resolver
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the remote node configuration
    pub fn validate(&self) -> Result<()> {
        validate_ae_title(&self.ae_title)?;

        if self.host.is_empty() {
            return Err(DimseError::config("Remote host cannot be empty"));
        }

        if self.port == 0 {
            return Err(DimseError::config("Remote port must be greater than 0"));
        }

        Ok(())
    }
}

impl fmt::Display for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.ae_title, self.host, self.port)
    }
}

fn validate_ae_title(aet: &str) -> Result<()> {
    if aet.trim().is_empty() || aet.len() > MAX_AE_TITLE_LEN {
        return Err(DimseError::InvalidAeTitle(format!(
            "'{}' must be 1-{} characters",
            aet, MAX_AE_TITLE_LEN
        )));
    }
    Ok(())
}

// Default value functions
fn default_local_aet() -> String {
    "DIMSE_SCU".to_string()
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_remote_port() -> u16 {
    DEFAULT_DIMSE_PORT
}

fn default_connect_timeout() -> u64 {
    3_000 // 3 seconds
}

fn default_idle_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_dispatch_buffer() -> usize {
    64
}
