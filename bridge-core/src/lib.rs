//! Liquid → Planetmint Bridge Core
//!
//! Conversion reconciliation engine for a one-way bridge relay. Deposits
//! arriving at relay-issued Liquid addresses are converted into Planetmint
//! mint instructions, exactly once per Liquid transaction.
//!
//! # Architecture
//!
//! - **ConversionStore**: durable map of receiving address → pending request
//! - **Conversion**: fixed-rate integer amount conversion
//! - **Gateways**: source/destination ledger capabilities (traits)
//! - **Executor**: per-request decision: no-op, mint, evict or retry
//! - **Scheduler**: periodic eviction and reconciliation jobs
//!
//! # Invariants
//!
//! - At most one mint per Liquid transaction: the destination ledger's
//!   mint record is the only proof of completion
//! - Requests are immutable; state is presence/absence in the store
//! - Only the scheduler deletes store entries

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod conversion;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod memory;
pub mod metrics;
pub mod relay;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-exports
pub use config::{Config, ReconciliationConfig, RocksDBConfig};
pub use conversion::{convert, normalize_amount};
pub use error::{Error, Result};
pub use executor::ConversionExecutor;
pub use gateway::{DestinationLedger, SourceLedger};
pub use memory::MemoryStore;
pub use metrics::Metrics;
pub use relay::Relay;
pub use scheduler::{ReconciliationScheduler, SchedulerHandle};
pub use storage::{ConversionStore, Storage};
pub use types::{ConversionOutcome, ConversionRequest, MintRecord, Receipt, ScanOrder};
