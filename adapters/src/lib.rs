//! # Ledger Adapters
//!
//! Wire-level clients behind the relay's gateway traits:
//! - Elements/Liquid wallet JSON-RPC (deposit listing, address allocation)
//! - Planetmint REST (mint lookup, machine lookup, mint submission through the
//!   signer service)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            bridge-core Relay                 │
//! └──────────┬──────────────────────┬────────────┘
//!            │ SourceLedger         │ DestinationLedger
//! ┌──────────▼─────────┐  ┌─────────▼────────────┐
//! │  ElementsClient    │  │  PlanetmintClient    │
//! │  (JSON-RPC 1.0)    │  │  (REST + signer)     │
//! └────────────────────┘  └──────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod elements;
pub mod error;
pub mod planetmint;

pub use elements::{AddressAllocator, ElementsClient, ElementsConfig};
pub use error::{Error, Result};
pub use planetmint::{MachineRegistry, PlanetmintClient, PlanetmintConfig};

/// Default request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
