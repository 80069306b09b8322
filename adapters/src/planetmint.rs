//! Planetmint REST client
//!
//! Mint lookups go to the chain's REST gateway. Mint submissions go to the
//! signer service, which owns the minting key and broadcasts the
//! transaction.

use crate::{Error, Result};
use async_trait::async_trait;
use bridge_core::types::MintRecord;
use bridge_core::DestinationLedger;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// gRPC status code for a missing entity
const GRPC_NOT_FOUND: i64 = 5;

/// Planetmint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetmintConfig {
    /// REST gateway base URL
    pub api_url: String,
    /// Signer service base URL
    pub signer_url: String,
    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for PlanetmintConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:1317".to_string(),
            signer_url: "http://127.0.0.1:8090".to_string(),
            timeout_secs: crate::DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }
}

/// Gateway response; proto field names, with the JSON camelCase form
/// accepted as well
#[derive(Debug, Deserialize)]
struct MintRequestByHashResponse {
    #[serde(alias = "mintRequest")]
    mint_request: Option<MintRequestBody>,
}

#[derive(Debug, Deserialize)]
struct MintRequestBody {
    beneficiary: String,
    #[serde(deserialize_with = "u64_from_string_or_number")]
    amount: u64,
    #[serde(alias = "liquidTxHash")]
    liquid_tx_hash: String,
}

/// Machine lookup response
#[derive(Debug, Deserialize)]
struct MachineByAddressResponse {
    machine: Option<MachineBody>,
}

#[derive(Debug, Deserialize)]
struct MachineBody {
    address: String,
}

/// gRPC gateway error body
#[derive(Debug, Deserialize)]
struct GatewayStatus {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Signer service request
#[derive(Debug, Serialize)]
struct MintInstruction<'a> {
    beneficiary: &'a str,
    amount: u64,
    liquid_tx_hash: &'a str,
}

/// Resolves Planetmint accounts to attested machines
#[async_trait]
pub trait MachineRegistry: Send + Sync {
    /// Address of the machine attested under `address`, `None` when the
    /// account has no machine
    async fn machine_address(&self, address: &str) -> Result<Option<String>>;
}

/// Protobuf JSON encodes 64-bit integers as strings
fn u64_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Planetmint client
#[derive(Debug, Clone)]
pub struct PlanetmintClient {
    config: PlanetmintConfig,
    client: Client,
}

impl PlanetmintClient {
    /// Create new Planetmint client
    pub fn new(config: PlanetmintConfig) -> Result<Self> {
        if config.api_url.is_empty() || config.signer_url.is_empty() {
            return Err(Error::Config(
                "planetmint api_url and signer_url are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Mint request recorded for `liquid_tx_hash`, if any
    pub async fn get_mint_request(&self, liquid_tx_hash: &str) -> Result<Option<MintRecord>> {
        let url = format!(
            "{}/planetmint/dao/mint_requests/{}",
            self.config.api_url.trim_end_matches('/'),
            liquid_tx_hash
        );
        debug!(url = %url, "Querying mint request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            return match serde_json::from_str::<GatewayStatus>(&body) {
                Ok(gateway) if gateway.code == GRPC_NOT_FOUND => Ok(None),
                Ok(gateway) => Err(Error::Api {
                    status_code: status.as_u16(),
                    message: gateway.message,
                }),
                Err(_) => Err(Error::Api {
                    status_code: status.as_u16(),
                    message: body,
                }),
            };
        }

        // Absence is reported as 404 / NotFound; a success must carry the record
        let decoded: MintRequestByHashResponse = serde_json::from_str(&body)?;
        let request = decoded.mint_request.ok_or_else(|| {
            Error::UnexpectedResponse(format!(
                "mint request lookup for {} returned no mint_request: {}",
                liquid_tx_hash, body
            ))
        })?;

        Ok(Some(MintRecord {
            beneficiary: request.beneficiary,
            amount: request.amount,
            liquid_tx_hash: request.liquid_tx_hash,
        }))
    }

    /// Machine attested under `address`, if any
    pub async fn get_machine_by_address(&self, address: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/planetmint/machine/address/{}",
            self.config.api_url.trim_end_matches('/'),
            address
        );
        debug!(url = %url, "Querying machine");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            return match serde_json::from_str::<GatewayStatus>(&body) {
                Ok(gateway) if gateway.code == GRPC_NOT_FOUND => Ok(None),
                Ok(gateway) => Err(Error::Api {
                    status_code: status.as_u16(),
                    message: gateway.message,
                }),
                Err(_) => Err(Error::Api {
                    status_code: status.as_u16(),
                    message: body,
                }),
            };
        }

        let decoded: MachineByAddressResponse = serde_json::from_str(&body)?;
        let machine = decoded.machine.ok_or_else(|| {
            Error::UnexpectedResponse(format!(
                "machine lookup for {} returned no machine: {}",
                address, body
            ))
        })?;

        Ok(Some(machine.address))
    }

    /// Hand a mint instruction to the signer service
    pub async fn mint(&self, beneficiary: &str, amount: u64, liquid_tx_hash: &str) -> Result<()> {
        let url = format!("{}/mint", self.config.signer_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&MintInstruction {
                beneficiary,
                amount,
                liquid_tx_hash,
            })
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        if response.status().is_success() {
            info!(
                tx_hash = %liquid_tx_hash,
                beneficiary = %beneficiary,
                amount,
                "Mint instruction accepted by signer"
            );
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(Error::Api {
                status_code: status,
                message: body,
            })
        }
    }
}

#[async_trait]
impl DestinationLedger for PlanetmintClient {
    async fn check_existing_mint(
        &self,
        liquid_tx_hash: &str,
    ) -> bridge_core::Result<Option<MintRecord>> {
        self.get_mint_request(liquid_tx_hash)
            .await
            .map_err(Error::into_destination)
    }

    async fn submit_mint(
        &self,
        beneficiary: &str,
        amount: u64,
        liquid_tx_hash: &str,
    ) -> bridge_core::Result<()> {
        self.mint(beneficiary, amount, liquid_tx_hash)
            .await
            .map_err(Error::into_destination)
    }
}

#[async_trait]
impl MachineRegistry for PlanetmintClient {
    async fn machine_address(&self, address: &str) -> Result<Option<String>> {
        self.get_machine_by_address(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_proto_field_names() {
        let decoded: MintRequestByHashResponse = serde_json::from_str(
            r#"{"mint_request":{"beneficiary":"plmnt1b","amount":"57033047","liquid_tx_hash":"abc"}}"#,
        )
        .unwrap();
        let request = decoded.mint_request.unwrap();
        assert_eq!(request.beneficiary, "plmnt1b");
        assert_eq!(request.amount, 57_033_047);
        assert_eq!(request.liquid_tx_hash, "abc");
    }

    #[test]
    fn test_amount_accepts_string_and_number() {
        let text: MintRequestByHashResponse = serde_json::from_str(
            r#"{"mintRequest":{"beneficiary":"plmnt1x","amount":"57033047","liquidTxHash":"aa"}}"#,
        )
        .unwrap();
        assert_eq!(text.mint_request.unwrap().amount, 57_033_047);

        let number: MintRequestByHashResponse = serde_json::from_str(
            r#"{"mintRequest":{"beneficiary":"plmnt1x","amount":42,"liquidTxHash":"aa"}}"#,
        )
        .unwrap();
        assert_eq!(number.mint_request.unwrap().amount, 42);
    }

    #[test]
    fn test_missing_urls_rejected() {
        let config = PlanetmintConfig {
            signer_url: String::new(),
            ..Default::default()
        };
        assert!(matches!(PlanetmintClient::new(config), Err(Error::Config(_))));
    }
}
