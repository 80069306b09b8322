//! Ledger gateway capabilities
//!
//! The executor only sees these traits; concrete RPC clients live in the
//! `adapters` crate and test doubles are substituted at construction time.

use crate::types::{MintRecord, Receipt};
use crate::Result;
use async_trait::async_trait;

/// Source ledger (Liquid) query capability
#[async_trait]
pub trait SourceLedger: Send + Sync {
    /// Confirmed receipts for `address` restricted to `asset_id`
    ///
    /// An address without deposits yields an empty list, not an error.
    async fn list_receipts(
        &self,
        address: &str,
        min_confirmations: u32,
        asset_id: &str,
    ) -> Result<Vec<Receipt>>;
}

/// Destination ledger (Planetmint) mint capability
#[async_trait]
pub trait DestinationLedger: Send + Sync {
    /// Existing mint record for a Liquid transaction, `None` when absent
    async fn check_existing_mint(&self, liquid_tx_hash: &str) -> Result<Option<MintRecord>>;

    /// Submit a mint instruction; broadcast durability is the gateway's concern
    async fn submit_mint(&self, beneficiary: &str, amount: u64, liquid_tx_hash: &str)
        -> Result<()>;
}
