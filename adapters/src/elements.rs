//! Elements/Liquid wallet JSON-RPC client
//!
//! Speaks JSON-RPC 1.0 with basic auth against the wallet endpoint
//! `http://<rpc_host>/wallet/<wallet>`. The node reports RPC failures with
//! a non-2xx status and an `error` object in the body, so bodies are decoded
//! before the status is checked.

use crate::{Error, Result};
use async_trait::async_trait;
use bridge_core::types::Receipt;
use bridge_core::SourceLedger;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Elements RPC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementsConfig {
    /// Node host and port (a scheme prefix is optional)
    pub rpc_host: String,
    /// RPC user
    pub rpc_user: String,
    /// RPC password
    pub rpc_pass: String,
    /// Wallet holding the receiving addresses
    pub wallet: String,
    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for ElementsConfig {
    fn default() -> Self {
        Self {
            rpc_host: "127.0.0.1:18884".to_string(),
            rpc_user: "user".to_string(),
            rpc_pass: "password".to_string(),
            wallet: "rddl2plmnt".to_string(),
            timeout_secs: crate::DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl ElementsConfig {
    /// Wallet RPC endpoint
    pub fn wallet_url(&self) -> String {
        let host = self.rpc_host.trim_end_matches('/');
        if host.contains("://") {
            format!("{}/wallet/{}", host, self.wallet)
        } else {
            format!("http://{}/wallet/{}", host, self.wallet)
        }
    }
}

/// Issues fresh receiving addresses
#[async_trait]
pub trait AddressAllocator: Send + Sync {
    /// Allocate a new confidential receiving address
    async fn new_address(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// One row of `listreceivedbyaddress`
#[derive(Debug, Deserialize)]
struct ReceivedByAddress {
    address: String,
    amount: f64,
    confirmations: u32,
    #[serde(default)]
    txids: Vec<String>,
}

impl ReceivedByAddress {
    fn into_receipt(self) -> Result<Receipt> {
        // Shortest round-trip rendering of the node's float
        let amount = Decimal::from_str(&self.amount.to_string()).map_err(|e| {
            Error::UnexpectedResponse(format!("amount {} is not decimal: {}", self.amount, e))
        })?;

        Ok(Receipt {
            address: self.address,
            amount,
            confirmations: self.confirmations,
            txids: self.txids,
        })
    }
}

/// Elements wallet client
#[derive(Debug, Clone)]
pub struct ElementsClient {
    config: ElementsConfig,
    url: String,
    client: Client,
}

impl ElementsClient {
    /// Create new Elements client
    pub fn new(config: ElementsConfig) -> Result<Self> {
        if config.wallet.is_empty() {
            return Err(Error::Config("elements wallet name is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        let url = config.wallet_url();
        Ok(Self {
            config,
            url,
            client,
        })
    }

    /// Wallet endpoint in use
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Confirmed receipts of `asset_id` at `address`
    pub async fn list_received_by_address(
        &self,
        address: &str,
        min_confirmations: u32,
        asset_id: &str,
    ) -> Result<Vec<Receipt>> {
        let rows: Vec<ReceivedByAddress> = self
            .call(
                "listreceivedbyaddress",
                json!([min_confirmations, false, true, address, asset_id]),
            )
            .await?;

        // The node applies the address filter; rows may carry the
        // unconfidential form of a confidential address
        rows.into_iter()
            .inspect(|row| {
                if row.address != address {
                    debug!(
                        requested = %address,
                        reported = %row.address,
                        "Receipt reported under another encoding"
                    );
                }
            })
            .map(ReceivedByAddress::into_receipt)
            .collect()
    }

    /// Fresh receiving address from the wallet
    pub async fn get_new_address(&self) -> Result<String> {
        self.call("getnewaddress", json!([])).await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        debug!(method, url = %self.url, "Elements RPC call");

        let payload = json!({
            "jsonrpc": "1.0",
            "id": "bridge",
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.config.rpc_user, Some(&self.config.rpc_pass))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let status = response.status();
        let body = response.text().await?;

        let decoded: RpcResponse<T> = match serde_json::from_str(&body) {
            Ok(decoded) => decoded,
            Err(_) if !status.is_success() => {
                return Err(Error::Api {
                    status_code: status.as_u16(),
                    message: body,
                })
            }
            Err(e) => return Err(Error::Json(e)),
        };

        if let Some(error) = decoded.error {
            return Err(Error::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        decoded
            .result
            .ok_or_else(|| Error::UnexpectedResponse(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl SourceLedger for ElementsClient {
    async fn list_receipts(
        &self,
        address: &str,
        min_confirmations: u32,
        asset_id: &str,
    ) -> bridge_core::Result<Vec<Receipt>> {
        self.list_received_by_address(address, min_confirmations, asset_id)
            .await
            .map_err(Error::into_source)
    }
}

#[async_trait]
impl AddressAllocator for ElementsClient {
    async fn new_address(&self) -> Result<String> {
        self.get_new_address().await
    }
}
