//! Configuration Manager

use super::Config;
use crate::protocol::TYPE_NAME_SIZE;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;

const MIN_DECODE_BODY_SIZE: u64 = 1024;
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, falling back to defaults if it does not exist.
    ///
    /// The result is not validated: command line values still have to be merged in.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            tracing::info!("Configuration loaded successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Load the optional file, apply command line values and validate.
    pub fn load(path: Option<&Path>, cli: &CliOverrides) -> Result<Config> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Config::default(),
        };
        config.merge_with_cli_args(cli);
        config
            .validate()
            .with_context(|| "Configuration validation failed")?;
        Ok(config)
    }
}

/// Values taken from the command line. These win over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub destination_host: Option<String>,
    pub destination_port: Option<u16>,
    pub listen_port: Option<u16>,
    pub blocked_types: Vec<String>,
    pub connect_timeout: Option<Duration>,
    pub log_level: Option<String>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_relay_config()
            .with_context(|| "Relay configuration validation failed")?;

        self.validate_filter_config()
            .with_context(|| "Filter configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_relay_config(&self) -> Result<()> {
        let relay = &self.relay;

        if relay.listen_port == 0 {
            bail!("listen_port must be greater than 0");
        }

        if relay.destination_port == 0 {
            bail!("destination_port must be greater than 0");
        }

        if relay.destination_host.trim().is_empty() {
            bail!("destination_host must not be empty");
        }

        relay.listen_socket_addr()?;

        if relay.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if relay.max_decode_body_size < MIN_DECODE_BODY_SIZE {
            bail!(
                "max_decode_body_size must be at least {} bytes",
                MIN_DECODE_BODY_SIZE
            );
        }

        Ok(())
    }

    fn validate_filter_config(&self) -> Result<()> {
        for (i, name) in self.filter.blocked_types.iter().enumerate() {
            if name.is_empty() {
                bail!("Blocked type {} is empty", i);
            }

            if name.len() > TYPE_NAME_SIZE {
                bail!(
                    "Blocked type '{}' exceeds the {}-byte type field and can never match",
                    name,
                    TYPE_NAME_SIZE
                );
            }
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", VALID_LOG_LEVELS.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, cli: &CliOverrides) {
        if let Some(host) = &cli.destination_host {
            self.relay.destination_host = host.clone();
            tracing::debug!("CLI override: destination host set to {}", host);
        }

        if let Some(port) = cli.destination_port {
            self.relay.destination_port = port;
            tracing::debug!("CLI override: destination port set to {}", port);
        }

        if let Some(port) = cli.listen_port {
            self.relay.listen_port = port;
            tracing::debug!("CLI override: listen port set to {}", port);
        }

        for name in &cli.blocked_types {
            if !self.filter.blocked_types.contains(name) {
                self.filter.blocked_types.push(name.clone());
            }
        }

        if let Some(timeout) = cli.connect_timeout {
            self.relay.connect_timeout = timeout;
            tracing::debug!("CLI override: connect timeout set to {:?}", timeout);
        }

        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Human-readable summary of the effective configuration.
    pub fn summary(&self) -> String {
        let blocked = if self.filter.blocked_types.is_empty() {
            "none".to_string()
        } else {
            self.blacklist().types().join(", ")
        };
        format!(
            "listen={}:{} destination={}:{} blocked=[{}] connect_timeout={} teardown_grace={} max_decode_body_size={} tcp_nodelay={}",
            self.relay.listen_addr,
            self.relay.listen_port,
            self.relay.destination_host,
            self.relay.destination_port,
            blocked,
            humantime::format_duration(self.relay.connect_timeout),
            humantime::format_duration(self.relay.teardown_grace),
            self.relay.max_decode_body_size,
            self.relay.tcp_nodelay
        )
    }
}
