//! Error types for adapters

use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON-RPC error object returned by the node
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// Non-success HTTP response from a ledger API
    #[error("Ledger API error {status_code}: {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap as a source ledger failure for the relay core
    pub fn into_source(self) -> bridge_core::Error {
        bridge_core::Error::SourceGateway(self.to_string())
    }

    /// Wrap as a destination ledger failure for the relay core
    pub fn into_destination(self) -> bridge_core::Error {
        bridge_core::Error::DestinationGateway(self.to_string())
    }
}
