//! Main relay orchestration layer
//!
//! This module ties together storage, executor, and scheduler components
//! into a high-level API built from one explicit configuration value.
//!
//! # Example
//!
//! ```no_run
//! use bridge_core::{Config, DestinationLedger, Relay, SourceLedger};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(
//!     source: Arc<dyn SourceLedger>,
//!     destination: Arc<dyn DestinationLedger>,
//! ) -> bridge_core::Result<()> {
//!     let relay = Relay::open(Config::default(), source, destination)?;
//!     relay.register_pending_conversion("tlq1qq...", "plmnt1...")?;
//!
//!     let handle = relay.start(CancellationToken::new());
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

use crate::{
    executor::ConversionExecutor,
    gateway::{DestinationLedger, SourceLedger},
    metrics::Metrics,
    scheduler::{ReconciliationScheduler, SchedulerHandle},
    storage::{ConversionStore, Storage},
    types::ConversionRequest,
    Config, Error, Result,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main relay interface
#[derive(Debug)]
pub struct Relay {
    /// Pending request store
    store: Arc<dyn ConversionStore>,

    /// Periodic jobs
    scheduler: Arc<ReconciliationScheduler>,

    /// Metrics collector
    metrics: Arc<Metrics>,

    /// Configuration
    config: Config,
}

impl Relay {
    /// Open the RocksDB store and wire the relay
    pub fn open(
        config: Config,
        source: Arc<dyn SourceLedger>,
        destination: Arc<dyn DestinationLedger>,
    ) -> Result<Self> {
        let store = Arc::new(Storage::open(&config)?);
        Self::with_store(config, store, source, destination)
    }

    /// Wire the relay around an existing store
    pub fn with_store(
        config: Config,
        store: Arc<dyn ConversionStore>,
        source: Arc<dyn SourceLedger>,
        destination: Arc<dyn DestinationLedger>,
    ) -> Result<Self> {
        config.reconciliation.validate()?;

        let metrics = Arc::new(Metrics::new()?);

        let executor = Arc::new(
            ConversionExecutor::new(source, destination, &config.reconciliation)
                .with_metrics(metrics.clone()),
        );

        let scheduler = Arc::new(
            ReconciliationScheduler::new(store.clone(), executor, config.reconciliation.clone())
                .with_metrics(metrics.clone()),
        );

        Ok(Self {
            store,
            scheduler,
            metrics,
            config,
        })
    }

    /// Record a pending conversion for a freshly issued receiving address
    pub fn register_pending_conversion(
        &self,
        source_address: &str,
        destination_address: &str,
    ) -> Result<ConversionRequest> {
        if source_address.trim().is_empty() {
            return Err(Error::InvalidRequest("source address is empty".to_string()));
        }
        if destination_address.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "destination address is empty".to_string(),
            ));
        }

        let request = ConversionRequest::new(source_address, destination_address);
        self.store.put(&request)?;

        tracing::info!(
            address = %request.source_address,
            beneficiary = %request.destination_address,
            "Registered pending conversion"
        );

        Ok(request)
    }

    /// Start eviction and reconciliation jobs
    pub fn start(&self, cancel: CancellationToken) -> SchedulerHandle {
        self.scheduler.clone().start(cancel)
    }

    /// Pending request store
    pub fn store(&self) -> &Arc<dyn ConversionStore> {
        &self.store
    }

    /// Scheduler (passes can be run directly)
    pub fn scheduler(&self) -> &Arc<ReconciliationScheduler> {
        &self.scheduler
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
