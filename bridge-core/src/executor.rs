//! Per-request conversion executor
//!
//! Decides, from live ledger state only, whether a pending request needs a
//! mint, is already satisfied, or must wait. The executor never touches the
//! store; the caller applies the eviction decision.

use crate::config::ReconciliationConfig;
use crate::conversion::{convert, normalize_amount};
use crate::gateway::{DestinationLedger, SourceLedger};
use crate::metrics::Metrics;
use crate::types::{ConversionOutcome, ConversionRequest};
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Conversion executor
pub struct ConversionExecutor {
    source: Arc<dyn SourceLedger>,
    destination: Arc<dyn DestinationLedger>,
    accepted_asset: String,
    min_confirmations: u32,
    gateway_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ConversionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionExecutor")
            .field("accepted_asset", &self.accepted_asset)
            .field("min_confirmations", &self.min_confirmations)
            .field("gateway_timeout", &self.gateway_timeout)
            .finish_non_exhaustive()
    }
}

impl ConversionExecutor {
    /// Create new executor
    pub fn new(
        source: Arc<dyn SourceLedger>,
        destination: Arc<dyn DestinationLedger>,
        config: &ReconciliationConfig,
    ) -> Self {
        Self {
            source,
            destination,
            accepted_asset: config.accepted_asset.clone(),
            min_confirmations: config.confirmations,
            gateway_timeout: config.gateway_timeout(),
            metrics: None,
        }
    }

    /// Attach metrics collector
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one reconciliation step for `request`
    ///
    /// `Ok(outcome)` carries the eviction decision; `Err` means the request
    /// stays pending and is retried on the next pass.
    pub async fn execute_potential_conversion(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutcome> {
        let address = request.source_address.as_str();

        // 1. Confirmed deposits of the accepted asset
        let receipts = self
            .call(
                "list_receipts",
                self.source
                    .list_receipts(address, self.min_confirmations, &self.accepted_asset),
            )
            .await?;

        // 2. Nothing arrived yet
        if receipts.is_empty() {
            debug!(
                address = %address,
                asset = %self.accepted_asset,
                "No deposit for accepted asset yet"
            );
            return Ok(ConversionOutcome::NoDeposit);
        }

        // 3. Deposit must map to exactly one transaction
        if receipts.len() > 1 || receipts[0].txids.len() != 1 {
            if let Some(metrics) = &self.metrics {
                metrics.ambiguous_deposits.inc();
            }
            return Err(Error::AmbiguousDeposit {
                address: address.to_string(),
                receipts: receipts.len(),
                txids: receipts[0].txids.len(),
            });
        }

        // 4. Single attributable transaction
        let receipt = &receipts[0];
        let liquid_tx_hash = receipt.txids[0].as_str();
        info!(address = %address, tx_hash = %liquid_tx_hash, "Deposit received");

        // 5. Destination ledger is the only proof of a completed mint
        let existing = self
            .call(
                "check_existing_mint",
                self.destination.check_existing_mint(liquid_tx_hash),
            )
            .await?;

        if let Some(record) = existing {
            debug!(
                tx_hash = %liquid_tx_hash,
                beneficiary = %record.beneficiary,
                amount = record.amount,
                "Transaction already minted"
            );
            return Ok(ConversionOutcome::AlreadyMinted {
                liquid_tx_hash: liquid_tx_hash.to_string(),
            });
        }

        // 6. Amount conversion
        let amount = convert(normalize_amount(receipt.amount)?)?;

        // 7. Mint; eviction waits for a later pass to observe the record
        self.call(
            "submit_mint",
            self.destination
                .submit_mint(&request.destination_address, amount, liquid_tx_hash),
        )
        .await
        .map_err(|e| {
            warn!(
                tx_hash = %liquid_tx_hash,
                beneficiary = %request.destination_address,
                amount,
                error = %e,
                "Mint submission failed"
            );
            e
        })?;

        if let Some(metrics) = &self.metrics {
            metrics.mints_submitted.inc();
        }
        info!(
            tx_hash = %liquid_tx_hash,
            beneficiary = %request.destination_address,
            amount,
            "Mint submitted"
        );

        Ok(ConversionOutcome::MintSubmitted {
            liquid_tx_hash: liquid_tx_hash.to_string(),
            amount,
        })
    }

    /// Bound a gateway call by the configured deadline
    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let result = match tokio::time::timeout(self.gateway_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::GatewayTimeout {
                operation,
                seconds: self.gateway_timeout.as_secs(),
            }),
        };

        if result.is_err() {
            if let Some(metrics) = &self.metrics {
                metrics.record_gateway_error(operation);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MintRecord, Receipt};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    struct StaticSource(Vec<Receipt>);

    #[async_trait]
    impl SourceLedger for StaticSource {
        async fn list_receipts(&self, _: &str, _: u32, _: &str) -> Result<Vec<Receipt>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct HangingDestination {
        mints: Mutex<u32>,
    }

    #[async_trait]
    impl DestinationLedger for HangingDestination {
        async fn check_existing_mint(&self, _: &str) -> Result<Option<MintRecord>> {
            std::future::pending().await
        }

        async fn submit_mint(&self, _: &str, _: u64, _: &str) -> Result<()> {
            *self.mints.lock() += 1;
            Ok(())
        }
    }

    fn receipt(txids: &[&str]) -> Receipt {
        Receipt {
            address: "tlq1src".to_string(),
            amount: Decimal::from_str("1.5").unwrap(),
            confirmations: 12,
            txids: txids.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_gateway_times_out() {
        let destination = Arc::new(HangingDestination::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let executor = ConversionExecutor::new(
            Arc::new(StaticSource(vec![receipt(&["aa"])])),
            destination.clone(),
            &ReconciliationConfig::default(),
        )
        .with_metrics(metrics.clone());

        let result = executor
            .execute_potential_conversion(&ConversionRequest::new("tlq1src", "plmnt1dst"))
            .await;

        assert!(matches!(
            result,
            Err(Error::GatewayTimeout {
                operation: "check_existing_mint",
                ..
            })
        ));
        assert_eq!(*destination.mints.lock(), 0);
        assert_eq!(
            metrics
                .gateway_errors
                .with_label_values(&["check_existing_mint"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_receipt_without_txid_is_ambiguous() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let executor = ConversionExecutor::new(
            Arc::new(StaticSource(vec![receipt(&[])])),
            Arc::new(HangingDestination::default()),
            &ReconciliationConfig::default(),
        )
        .with_metrics(metrics.clone());

        let result = executor
            .execute_potential_conversion(&ConversionRequest::new("tlq1src", "plmnt1dst"))
            .await;

        assert!(matches!(
            result,
            Err(Error::AmbiguousDeposit { receipts: 1, txids: 0, .. })
        ));
        assert_eq!(metrics.ambiguous_deposits.get(), 1);
    }
}
