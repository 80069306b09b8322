//! Node configuration
//!
//! One TOML file carries the HTTP surface settings, both ledger clients and
//! the relay core. Environment variables prefixed `BRIDGE_` override the
//! defaults when no file is used.

use adapters::{ElementsConfig, PlanetmintConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this layout
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Default config could not be rendered
    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// Relay section rejected
    #[error("Relay config: {0}")]
    Relay(#[from] bridge_core::Error),

    /// Environment variable with an unparsable value
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

/// Full node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP bind address
    pub service_bind: String,

    /// HTTP port
    pub service_port: u16,

    /// Default log directive when `RUST_LOG` is unset
    pub log_level: String,

    /// Liquid wallet RPC
    pub elements: ElementsConfig,

    /// Planetmint REST and signer
    pub planetmint: PlanetmintConfig,

    /// Relay core
    pub relay: bridge_core::Config,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            service_bind: "localhost".to_string(),
            service_port: 8080,
            log_level: "info".to_string(),
            elements: ElementsConfig::default(),
            planetmint: PlanetmintConfig::default(),
            relay: bridge_core::Config::default(),
        }
    }
}

impl NodeConfig {
    /// Load from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables over defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = NodeConfig {
            relay: bridge_core::Config::from_env()?,
            ..Default::default()
        };

        if let Ok(bind) = std::env::var("BRIDGE_SERVICE_BIND") {
            config.service_bind = bind;
        }
        if let Ok(value) = std::env::var("BRIDGE_SERVICE_PORT") {
            config.service_port = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "BRIDGE_SERVICE_PORT",
                value,
            })?;
        }
        if let Ok(level) = std::env::var("BRIDGE_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(host) = std::env::var("BRIDGE_ELEMENTS_RPC_HOST") {
            config.elements.rpc_host = host;
        }
        if let Ok(user) = std::env::var("BRIDGE_ELEMENTS_RPC_USER") {
            config.elements.rpc_user = user;
        }
        if let Ok(pass) = std::env::var("BRIDGE_ELEMENTS_RPC_PASS") {
            config.elements.rpc_pass = pass;
        }
        if let Ok(wallet) = std::env::var("BRIDGE_ELEMENTS_WALLET") {
            config.elements.wallet = wallet;
        }

        if let Ok(url) = std::env::var("BRIDGE_PLANETMINT_API_URL") {
            config.planetmint.api_url = url;
        }
        if let Ok(url) = std::env::var("BRIDGE_PLANETMINT_SIGNER_URL") {
            config.planetmint.signer_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or write a default file there and return `None`
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path).map(Some);
        }

        Self::write_default(path)?;
        Ok(None)
    }

    /// Write the default configuration as TOML
    pub fn write_default(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let rendered = toml::to_string_pretty(&NodeConfig::default())?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    /// `bind:port` for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.service_bind, self.service_port)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.relay.reconciliation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("app.toml");

        assert!(NodeConfig::load_or_init(&path).unwrap().is_none());
        assert!(path.exists());

        // Second start picks up the written defaults
        let loaded = NodeConfig::load_or_init(&path).unwrap().unwrap();
        assert_eq!(loaded.service_port, 8080);
        assert_eq!(loaded.relay.reconciliation.confirmations, 10);
        assert_eq!(loaded.elements.wallet, ElementsConfig::default().wallet);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(
            &path,
            r#"
service_port = 9090
log_level = "debug"

[elements]
rpc_host = "liquid.example:18884"
wallet = "bridge"

[relay.reconciliation]
confirmations = 2
"#,
        )
        .unwrap();

        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.listen_addr(), "localhost:9090");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.elements.wallet, "bridge");
        assert_eq!(config.elements.rpc_user, "user");
        assert_eq!(config.relay.reconciliation.confirmations, 2);
        assert_eq!(config.relay.reconciliation.scan_interval_secs, 120);
    }

    #[test]
    fn test_invalid_relay_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[relay.reconciliation]\nscan_interval_secs = 0\n").unwrap();

        assert!(matches!(
            NodeConfig::from_file(&path),
            Err(ConfigError::Relay(_))
        ));
    }
}
