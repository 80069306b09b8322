//! Reconciliation scheduler
//!
//! Two independent periodic jobs:
//! - **Eviction** (default every 2h): drops requests older than the horizon
//! - **Reconciliation** (default every 2m): runs the executor against every
//!   request, newest first, and deletes entries it marks for eviction
//!
//! Every tick spawns its pass, so a slow pass never delays the next tick or
//! the other job. Overlapping passes of the same job are tolerated: store
//! mutations are independently safe and every decision is re-derived from
//! live ledger state.

use crate::config::ReconciliationConfig;
use crate::executor::ConversionExecutor;
use crate::metrics::Metrics;
use crate::storage::ConversionStore;
use crate::types::{ConversionRequest, ScanOrder};
use crate::{Error, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Entries buffered between the scanning task and a reconciliation pass
const SCAN_CHANNEL_CAPACITY: usize = 64;

/// Counts from one eviction pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries inspected
    pub scanned: usize,
    /// Entries removed
    pub evicted: usize,
    /// Unreadable entries or failed deletes
    pub failed: usize,
}

/// Counts from one reconciliation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Entries inspected
    pub scanned: usize,
    /// Entries without a deposit yet
    pub no_deposit: usize,
    /// Mint instructions submitted
    pub minted: usize,
    /// Entries removed as already minted
    pub evicted: usize,
    /// Entries retained with an error
    pub failed: usize,
}

/// Drives eviction and reconciliation passes
pub struct ReconciliationScheduler {
    store: Arc<dyn ConversionStore>,
    executor: Arc<ConversionExecutor>,
    config: ReconciliationConfig,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ReconciliationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReconciliationScheduler {
    /// Create new scheduler
    pub fn new(
        store: Arc<dyn ConversionStore>,
        executor: Arc<ConversionExecutor>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
            metrics: None,
        }
    }

    /// Attach metrics collector
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Delete every entry older than the eviction horizon at `now`
    pub fn run_eviction_pass(&self, now: i64) -> EvictionReport {
        let mut report = EvictionReport::default();

        for entry in self.store.scan(ScanOrder::Insertion) {
            let (key, request) = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!(error = %e, "Skipping unreadable entry during eviction");
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            if request.age_secs(now) <= self.config.eviction_horizon_secs {
                continue;
            }

            match self.store.delete(&key) {
                Ok(()) => {
                    report.evicted += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.stale_evicted.inc();
                    }
                    info!(
                        address = %key,
                        age_secs = request.age_secs(now),
                        "Evicted stale conversion request"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    error!(address = %key, error = %e, "Failed to evict entry");
                }
            }
        }

        debug!(?report, "Eviction pass finished");
        report
    }

    /// Run the executor against every entry, newest first
    pub async fn run_reconciliation_pass(&self) -> ReconciliationReport {
        let started = std::time::Instant::now();
        let mut report = ReconciliationReport::default();

        let mut entries = self.spawn_scan(ScanOrder::ReverseInsertion);
        while let Some(entry) = entries.recv().await {
            let (key, request) = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!(error = %e, "Skipping unreadable entry during reconciliation");
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            match self.executor.execute_potential_conversion(&request).await {
                Ok(outcome) if outcome.should_evict() => match self.delete(&key).await {
                    Ok(()) => {
                        report.evicted += 1;
                        if let Some(metrics) = &self.metrics {
                            metrics.duplicates_evicted.inc();
                        }
                        info!(address = %key, ?outcome, "Conversion completed, entry evicted");
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(address = %key, error = %e, "Failed to delete completed entry");
                    }
                },
                Ok(crate::ConversionOutcome::MintSubmitted { .. }) => report.minted += 1,
                Ok(_) => report.no_deposit += 1,
                Err(e) => {
                    report.failed += 1;
                    log_conversion_error(&key, &e);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.pass_duration.observe(started.elapsed().as_secs_f64());
            let store = self.store.clone();
            match tokio::task::spawn_blocking(move || store.approximate_len()).await {
                Ok(Ok(len)) => metrics.pending_requests.set(len as i64),
                Ok(Err(e)) => warn!(error = %e, "Failed to read store size"),
                Err(e) => warn!(error = %e, "Store size task failed"),
            }
        }

        debug!(?report, "Reconciliation pass finished");
        report
    }

    /// Scan `order` on a blocking thread, handing entries over a bounded channel
    fn spawn_scan(&self, order: ScanOrder) -> mpsc::Receiver<Result<(String, ConversionRequest)>> {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            for entry in store.scan(order) {
                // Receiver gone: the pass was dropped
                if tx.blocking_send(entry).is_err() {
                    break;
                }
            }
        });
        rx
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let store = self.store.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.delete(&key))
            .await
            .map_err(|e| Error::Storage(format!("delete task failed: {}", e)))?
    }

    /// Start both periodic jobs
    ///
    /// Each job gets a child of `cancel`; cancelling the parent stops both.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> SchedulerHandle {
        info!(
            scan_interval_secs = self.config.scan_interval_secs,
            eviction_interval_secs = self.config.eviction_interval_secs,
            eviction_horizon_secs = self.config.eviction_horizon_secs,
            "Starting reconciliation scheduler"
        );

        let scheduler = self.clone();
        let eviction = PeriodicTask::spawn(
            "eviction",
            self.config.eviction_interval(),
            cancel.child_token(),
            move || {
                let scheduler = scheduler.clone();
                async move {
                    let now = Utc::now().timestamp();
                    if let Err(e) =
                        tokio::task::spawn_blocking(move || scheduler.run_eviction_pass(now)).await
                    {
                        error!(error = %e, "Eviction pass aborted");
                    }
                }
            },
        );

        let scheduler = self.clone();
        let reconciliation = PeriodicTask::spawn(
            "reconciliation",
            self.config.scan_interval(),
            cancel.child_token(),
            move || {
                let scheduler = scheduler.clone();
                async move {
                    scheduler.run_reconciliation_pass().await;
                }
            },
        );

        SchedulerHandle {
            eviction,
            reconciliation,
            cancel,
        }
    }
}

fn log_conversion_error(key: &str, error: &Error) {
    match error {
        // Persistent until resolved by an operator; reported on every pass
        Error::AmbiguousDeposit { .. } => {
            error!(address = %key, error = %error, "Ambiguous deposit retained, manual resolution required")
        }
        e if e.is_retryable() => {
            warn!(address = %key, error = %e, "Conversion attempt failed, will retry")
        }
        e => error!(address = %key, error = %e, "Conversion attempt failed"),
    }
}

/// Cancellable periodic job
///
/// The first tick fires one period after spawning. Each tick spawns the job
/// without awaiting it.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn the ticker loop
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        cancel: CancellationToken,
        job: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!(job = name, "Periodic job cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        debug!(job = name, "Tick");
                        tokio::spawn(job());
                    }
                }
            }
        });

        Self {
            name,
            cancel,
            handle,
        }
    }

    /// Job name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop future ticks; passes already running are not interrupted
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the ticker loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the ticker loop to exit
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!(job = self.name, error = %e, "Periodic job panicked");
        }
    }
}

/// Handles of both scheduler jobs
#[derive(Debug)]
pub struct SchedulerHandle {
    /// Eviction job
    pub eviction: PeriodicTask,
    /// Reconciliation job
    pub reconciliation: PeriodicTask,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    /// Cancel both jobs and wait for their ticker loops to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.eviction.join().await;
        self.reconciliation.join().await;
        info!("Reconciliation scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_slow_pass_does_not_delay_ticks() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();

        let task = PeriodicTask::spawn(
            "slow",
            Duration::from_secs(10),
            CancellationToken::new(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    // Far longer than the period
                    tokio::time::sleep(Duration::from_secs(100)).await;
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(started.load(Ordering::SeqCst), 3);

        task.cancel();
        task.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let parent = CancellationToken::new();

        let task = PeriodicTask::spawn(
            "counter",
            Duration::from_secs(10),
            parent.child_token(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        parent.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(task.is_finished());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(task.name(), "counter");
    }
}
