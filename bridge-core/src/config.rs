//! Configuration for the relay core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Reconciliation configuration
    pub reconciliation: ReconciliationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/conversions"),
            rocksdb: RocksDBConfig::default(),
            reconciliation: ReconciliationConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16, // pending requests are tiny
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Liquid asset id eligible for conversion
    pub accepted_asset: String,

    /// Minimum confirmations before a deposit is acted upon
    pub confirmations: u32,

    /// Reconciliation scan period (seconds)
    pub scan_interval_secs: u64,

    /// Eviction job period (seconds)
    pub eviction_interval_secs: u64,

    /// Age after which a pending request is evicted (seconds)
    pub eviction_horizon_secs: i64,

    /// Deadline for every ledger gateway call (seconds)
    pub gateway_timeout_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            accepted_asset: "7add40beb27df701e02ee85089c5bc0021bc813823fedb5f1dcb5debda7f3da9"
                .to_string(),
            confirmations: 10,
            scan_interval_secs: 2 * 60,          // 2 minutes
            eviction_interval_secs: 2 * 60 * 60, // 2 hours
            eviction_horizon_secs: 12 * 60 * 60, // 12 hours
            gateway_timeout_secs: 30,
        }
    }
}

impl ReconciliationConfig {
    /// Scan period
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Eviction period
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    /// Gateway deadline
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.accepted_asset.is_empty() {
            return Err(crate::Error::Config("accepted_asset must be set".to_string()));
        }
        if self.scan_interval_secs == 0 || self.eviction_interval_secs == 0 {
            return Err(crate::Error::Config(
                "job intervals must be greater than zero".to_string(),
            ));
        }
        if self.gateway_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "gateway_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.eviction_horizon_secs <= 0 {
            return Err(crate::Error::Config(
                "eviction_horizon_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.reconciliation.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("BRIDGE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(asset) = std::env::var("BRIDGE_ACCEPTED_ASSET") {
            config.reconciliation.accepted_asset = asset;
        }

        if let Ok(value) = std::env::var("BRIDGE_CONFIRMATIONS") {
            config.reconciliation.confirmations = parse_env("BRIDGE_CONFIRMATIONS", &value)?;
        }

        if let Ok(value) = std::env::var("BRIDGE_SCAN_INTERVAL_SECS") {
            config.reconciliation.scan_interval_secs =
                parse_env("BRIDGE_SCAN_INTERVAL_SECS", &value)?;
        }

        if let Ok(value) = std::env::var("BRIDGE_GATEWAY_TIMEOUT_SECS") {
            config.reconciliation.gateway_timeout_secs =
                parse_env("BRIDGE_GATEWAY_TIMEOUT_SECS", &value)?;
        }

        config.reconciliation.validate()?;
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value for {}: {}", name, value)))
}
