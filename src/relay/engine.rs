//! Relay Engine
//!
//! Opens the outbound connection for each accepted client.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;

/// Connects to the configured destination.
#[derive(Debug, Clone)]
pub struct RelayEngine {
    destination_host: String,
    destination_port: u16,
    connect_timeout: Duration,
    tcp_nodelay: bool,
}

impl RelayEngine {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            destination_host: config.destination_host.clone(),
            destination_port: config.destination_port,
            connect_timeout: config.connect_timeout,
            tcp_nodelay: config.tcp_nodelay,
        }
    }

    /// `host:port` of the destination.
    pub fn target(&self) -> String {
        format!("{}:{}", self.destination_host, self.destination_port)
    }

    /// Resolve the destination and connect to the first address that answers.
    pub async fn connect_to_destination(&self) -> Result<(TcpStream, SocketAddr), RelayError> {
        let target = self.target();
        debug!("Attempting to connect to destination: {}", target);

        let addrs = self.resolve(&target).await?;

        let mut last_error = None;
        for addr in addrs {
            match self.try_connect_to_address(addr).await {
                Ok(stream) => {
                    if self.tcp_nodelay {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY on {}: {}", addr, e);
                        }
                    }
                    info!("Connected to destination: {}", addr);
                    return Ok((stream, addr));
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(RelayError::ConnectFailed {
            target,
            reason: last_error.unwrap_or_else(|| "no addresses resolved".to_string()),
        })
    }

    async fn resolve(&self, target: &str) -> Result<Vec<SocketAddr>, RelayError> {
        let failed = |reason: String| RelayError::ConnectFailed {
            target: target.to_string(),
            reason,
        };

        match timeout(self.connect_timeout, lookup_host(target)).await {
            Ok(Ok(addrs)) => {
                let resolved: Vec<SocketAddr> = addrs.collect();
                if resolved.is_empty() {
                    return Err(failed("DNS resolution returned no addresses".to_string()));
                }
                debug!("Resolved {} to {} addresses", target, resolved.len());
                Ok(resolved)
            }
            Ok(Err(e)) => {
                error!("DNS resolution failed for {}: {}", target, e);
                Err(failed(format!("DNS resolution failed: {}", e)))
            }
            Err(_) => {
                error!("DNS resolution timed out for {}", target);
                Err(failed("DNS resolution timed out".to_string()))
            }
        }
    }

    async fn try_connect_to_address(&self, addr: SocketAddr) -> Result<TcpStream, String> {
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(format!("connection failed: {}", e)),
            Err(_) => Err("connection timed out".to_string()),
        }
    }
}
