//! # Bridge Node
//!
//! Process wiring for the Liquid → Planetmint relay: configuration, logging,
//! the HTTP registration endpoint and the reconciliation scheduler.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod api;
pub mod config;

pub use api::{router, AppState, ReceiveAddressResponse};
pub use config::{ConfigError, NodeConfig};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_line_number(true)
        .init();
}
