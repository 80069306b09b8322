//! Core types for the relay

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pending conversion registered for a freshly issued receiving address
///
/// Immutable after creation. Lifecycle transitions are expressed by the
/// record's presence in or absence from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Liquid receiving address (store key)
    pub source_address: String,

    /// Planetmint beneficiary
    pub destination_address: String,

    /// Unix timestamp (seconds) of registration
    pub created_at: i64,
}

impl ConversionRequest {
    /// Create a request stamped with the current time
    pub fn new(source_address: impl Into<String>, destination_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            destination_address: destination_address.into(),
            created_at: Utc::now().timestamp(),
        }
    }

    /// Age in seconds relative to `now`
    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.created_at
    }
}

/// One row of the source ledger's received-by-address listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Receiving address
    pub address: String,

    /// Received amount in display units (e.g. 570330.47944743)
    pub amount: Decimal,

    /// Confirmations of the most recent transaction
    pub confirmations: u32,

    /// Transactions that paid into the address
    pub txids: Vec<String>,
}

/// Destination-side proof that a Liquid transaction was already credited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    /// Planetmint beneficiary
    pub beneficiary: String,

    /// Minted amount (smallest units)
    pub amount: u64,

    /// Liquid transaction that funded the mint
    pub liquid_tx_hash: String,
}

/// Result of a single reconciliation attempt
///
/// Retryable failures are carried by the `Err` arm of the executor's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// No matching deposit yet
    NoDeposit,

    /// Mint instruction accepted by the destination gateway
    MintSubmitted {
        /// Liquid transaction
        liquid_tx_hash: String,
        /// Minted amount (smallest units)
        amount: u64,
    },

    /// Destination ledger already holds a mint for this deposit
    AlreadyMinted {
        /// Liquid transaction
        liquid_tx_hash: String,
    },
}

impl ConversionOutcome {
    /// Whether the store entry should be deleted
    ///
    /// A freshly submitted mint is kept until a later pass observes the
    /// mint record on the destination ledger.
    pub fn should_evict(&self) -> bool {
        matches!(self, ConversionOutcome::AlreadyMinted { .. })
    }
}

/// Store traversal order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    /// Oldest first
    Insertion,

    /// Newest first
    ReverseInsertion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_already_minted_evicts() {
        assert!(!ConversionOutcome::NoDeposit.should_evict());
        assert!(!ConversionOutcome::MintSubmitted {
            liquid_tx_hash: "aa".into(),
            amount: 1,
        }
        .should_evict());
        assert!(ConversionOutcome::AlreadyMinted {
            liquid_tx_hash: "aa".into()
        }
        .should_evict());
    }

    #[test]
    fn test_request_age() {
        let mut request = ConversionRequest::new("tlq1src", "plmnt1dst");
        request.created_at = 1_000;
        assert_eq!(request.age_secs(4_600), 3_600);
    }
}
