//! Configuration handling for the sockio demo client.
//!
//! This module reads the YAML config file and applies `SOCKIO_*`
//! environment overrides on top of it. Command line flags are applied last
//! by `main`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sockio::{ClientConfig, ProtocolVersion};
use std::path::Path;
use tracing::{info, warn};

/// Demo client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Connection settings
    pub client: ClientConfig,
    /// Event emitted once connected
    pub event: String,
    /// Data sent with the event
    pub message: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("http://localhost:3000"),
            event: "message".to_string(),
            message: "Hello".to_string(),
        }
    }
}

impl DemoConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<DemoConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?} ({}), using defaults",
                        config_path.as_ref(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", config_path.as_ref());
                Self::default()
            }
        };

        config.apply_environment_overrides();

        info!(
            "Final client configuration: host={}, path={}, version={}, reconnect={}, reconnect_delay={:?}",
            config.client.host,
            config.client.path,
            config.client.version,
            config.client.reconnect,
            config.client.reconnect_delay
        );

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SOCKIO_HOST") {
            self.client.host = host;
            info!("Host overridden by environment: {}", self.client.host);
        }

        if let Some(path) = lookup("SOCKIO_PATH") {
            self.client.path = path;
            info!("Path overridden by environment: {}", self.client.path);
        }

        if let Some(version) = lookup("SOCKIO_VERSION") {
            match version.parse::<ProtocolVersion>() {
                Ok(version) => {
                    self.client.version = version;
                    info!("Protocol version overridden by environment: {}", version);
                }
                Err(e) => warn!("Ignoring SOCKIO_VERSION: {}", e),
            }
        }

        if let Some(delay) = lookup("SOCKIO_RECONNECT_DELAY") {
            match humantime::parse_duration(&delay) {
                Ok(delay) => {
                    self.client.reconnect_delay = delay;
                    info!("Reconnect delay overridden by environment: {:?}", delay);
                }
                Err(e) => warn!("Ignoring SOCKIO_RECONNECT_DELAY {:?}: {}", delay, e),
            }
        }
    }
}
