//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::RelayError;
use crate::protocol::DEFAULT_PORT;
use crate::relay::dispatcher::DEFAULT_MAX_DECODE_BODY_SIZE;
use crate::relay::BlacklistFilter;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub relay: RelayConfig,
    pub filter: FilterConfig,
    pub logging: LoggingConfig,
}

/// Listener, destination and relay tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub listen_port: u16,
    pub destination_host: String,
    pub destination_port: u16,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Time the surviving direction gets to stop on its own during teardown.
    #[serde(with = "humantime_serde")]
    pub teardown_grace: Duration,
    pub max_decode_body_size: u64,
    pub tcp_nodelay: bool,
}

/// Message type blacklist
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    pub blocked_types: Vec<String>,
}

/// Operational log settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Buffer the message log instead of flushing it after every line.
    pub buffered_output: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: DEFAULT_PORT,
            destination_host: "localhost".to_string(),
            destination_port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            teardown_grace: Duration::from_secs(2),
            max_decode_body_size: DEFAULT_MAX_DECODE_BODY_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            buffered_output: false,
        }
    }
}

impl RelayConfig {
    /// Address the accept loop binds to.
    pub fn listen_socket_addr(&self) -> Result<SocketAddr, RelayError> {
        let addr = if self.listen_addr.contains(':') {
            format!("[{}]:{}", self.listen_addr, self.listen_port)
        } else {
            format!("{}:{}", self.listen_addr, self.listen_port)
        };
        addr.parse()
            .map_err(|e| RelayError::Config(format!("invalid listen address {}: {}", addr, e)))
    }
}

impl Config {
    /// Build the process-wide blacklist.
    pub fn blacklist(&self) -> BlacklistFilter {
        BlacklistFilter::new(self.filter.blocked_types.iter().cloned())
    }
}
