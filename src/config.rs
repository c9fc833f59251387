//! RingElect Configuration
//!
//! A node needs two addresses: where it listens for its upstream peer and
//! which neighbor it connects to. Two file formats are accepted:
//!
//! The plain two-line format
//!
//! ```text
//! 127.0.0.1,5001
//! 127.0.0.1,5002
//! ```
//!
//! and, for files ending in `.toml`, a TOML document that can also tune the
//! retry cadence and receive timeout.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main RingElect configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Ring topology and timing
    pub ring: RingSection,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address to accept the inbound peer on (ip:port)
    pub listen_address: String,
}

/// Ring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingSection {
    /// Outbound neighbor address (ip:port)
    pub neighbor_address: String,

    /// Delay between outbound connection attempts in milliseconds
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,

    /// Idle receive timeout in milliseconds
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
}

// Default value functions
fn default_connect_retry_ms() -> u64 {
    10_000
}

fn default_receive_timeout_ms() -> u64 {
    1_000
}

impl RingConfig {
    /// Build a configuration with default timings
    pub fn new(listen_address: impl Into<String>, neighbor_address: impl Into<String>) -> Self {
        Self {
            node: NodeConfig {
                listen_address: listen_address.into(),
            },
            ring: RingSection {
                neighbor_address: neighbor_address.into(),
                connect_retry_ms: default_connect_retry_ms(),
                receive_timeout_ms: default_receive_timeout_ms(),
            },
        }
    }

    /// Load configuration from a file, picking the format by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            Self::from_toml(&content)
        } else {
            Self::from_lines(&content)
        }
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: RingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the two-line `ip,port` format
    pub fn from_lines(content: &str) -> Result<Self> {
        let mut lines = content.lines();
        let listen = parse_endpoint(lines.next(), "listen")?;
        let neighbor = parse_endpoint(lines.next(), "neighbor")?;

        let config = Self::new(listen, neighbor);
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration in the two-line format
    pub fn to_lines(&self) -> Result<String> {
        Ok(format!(
            "{}\n{}\n",
            endpoint_line(&self.node.listen_address)?,
            endpoint_line(&self.ring.neighbor_address)?,
        ))
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.node.listen_address.is_empty() {
            return Err(Error::Config("node.listen_address cannot be empty".into()));
        }

        if self.ring.neighbor_address.is_empty() {
            return Err(Error::Config("ring.neighbor_address cannot be empty".into()));
        }

        split_address(&self.node.listen_address)?;
        split_address(&self.ring.neighbor_address)?;

        if self.ring.connect_retry_ms == 0 {
            return Err(Error::Config("ring.connect_retry_ms must be positive".into()));
        }

        if self.ring.receive_timeout_ms == 0 {
            return Err(Error::Config("ring.receive_timeout_ms must be positive".into()));
        }

        Ok(())
    }

    /// Get the listen address
    pub fn listen_address(&self) -> &str {
        &self.node.listen_address
    }

    /// Get the neighbor address
    pub fn neighbor_address(&self) -> &str {
        &self.ring.neighbor_address
    }

    /// Get the connect retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.ring.connect_retry_ms)
    }

    /// Get the receive timeout as Duration
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.ring.receive_timeout_ms)
    }
}

/// Parse an `ip,port` line into `ip:port`
fn parse_endpoint(line: Option<&str>, what: &str) -> Result<String> {
    let line = line
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| Error::Config(format!("missing {} line", what)))?;

    let mut parts = line.split(',');
    let ip = parts.next().map(str::trim).unwrap_or_default();
    let port = parts
        .next()
        .map(str::trim)
        .ok_or_else(|| Error::Config(format!("{} line must be ip,port: {:?}", what, line)))?;

    if parts.next().is_some() {
        return Err(Error::Config(format!("{} line has extra fields: {:?}", what, line)));
    }
    if ip.is_empty() {
        return Err(Error::Config(format!("{} ip cannot be empty", what)));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| Error::Config(format!("invalid {} port {:?}", what, port)))?;

    Ok(format!("{}:{}", ip, port))
}

/// Split `host:port`, checking the port
fn split_address(address: &str) -> Result<(&str, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| Error::Config(format!("address must be host:port: {:?}", address)))?;
    if host.is_empty() {
        return Err(Error::Config(format!("address has no host: {:?}", address)));
    }
    let port = port
        .parse()
        .map_err(|_| Error::Config(format!("invalid port in address {:?}", address)))?;
    Ok((host, port))
}

fn endpoint_line(address: &str) -> Result<String> {
    let (host, port) = split_address(address)?;
    Ok(format!("{},{}", host, port))
}
