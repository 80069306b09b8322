//! Error types for the relay core

use thiserror::Error;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Relay errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Stored record could not be decoded
    #[error("Corrupt record for key {key}: {reason}")]
    CorruptRecord {
        /// Store key
        key: String,
        /// Decode failure
        reason: String,
    },

    /// Source ledger (Liquid) query failed
    #[error("Source gateway error: {0}")]
    SourceGateway(String),

    /// Destination ledger (Planetmint) call failed
    #[error("Destination gateway error: {0}")]
    DestinationGateway(String),

    /// Gateway call exceeded its deadline
    #[error("Timeout after {seconds}s: {operation}")]
    GatewayTimeout {
        /// Operation
        operation: &'static str,
        /// Timeout duration
        seconds: u64,
    },

    /// Deposit cannot be attributed to a single transaction
    #[error("Ambiguous deposit at {address}: {receipts} receipt(s), {txids} txid(s)")]
    AmbiguousDeposit {
        /// Receiving address
        address: String,
        /// Matching receipt records
        receipts: usize,
        /// Transaction ids on the first record
        txids: usize,
    },

    /// Arithmetic overflow while computing an amount
    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    /// Amount not representable in smallest units
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid registration request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the condition is expected to clear on its own by the next pass
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SourceGateway(_)
                | Error::DestinationGateway(_)
                | Error::GatewayTimeout { .. }
                | Error::Storage(_)
                | Error::Io(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
