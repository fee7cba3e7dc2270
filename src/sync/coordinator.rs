//! Sync Coordinator
//!
//! Owns the table registry and the source list, drives periodic sweeps and
//! serves the retrieval side of the protocol.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;
use uuid::Uuid;

use super::registry::{Registry, SourceSet};
use super::session::{SessionConfig, SyncOutcome, SyncSession};
use super::{Page, Syncer};
use crate::config::TableSyncConfig;
use crate::error::{Error, Result};
use crate::store::Store;

/// Outcome of one (source, table) pair within a sweep
#[derive(Debug)]
pub struct PairResult {
    pub source: String,
    pub table: String,
    pub outcome: Result<SyncOutcome>,
}

/// Summary of one sweep
#[derive(Debug)]
pub struct SweepReport {
    pub sweep_id: Uuid,
    pub results: Vec<PairResult>,
    pub elapsed: Duration,
}

impl SweepReport {
    /// Pairs that completed
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    /// Pairs that were abandoned
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Rows received across all pairs
    pub fn received(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .map(|o| o.received)
            .sum()
    }

    /// New rows persisted across all pairs
    pub fn records(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .map(|o| o.records)
            .sum()
    }
}

/// Replication coordinator, one per process.
///
/// Tables and sources are registered through `&mut self` before the
/// coordinator is shared; afterwards it is only read.
pub struct SyncCoordinator {
    enabled: bool,
    period: Duration,
    session: SessionConfig,
    registry: Registry,
    sources: SourceSet,
}

impl SyncCoordinator {
    /// Create a coordinator with no tables or sources.
    ///
    /// The sweep period must be non-zero.
    pub fn new(enabled: bool, period: Duration, session: SessionConfig) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::Config("sync period must be positive".into()));
        }

        Ok(Self {
            enabled,
            period,
            session,
            registry: Registry::new(),
            sources: SourceSet::new(),
        })
    }

    /// Create a coordinator from the `[sync]` configuration
    pub fn from_config(config: &TableSyncConfig) -> Result<Self> {
        let session = SessionConfig {
            page_size: config.sync.page_size,
            retry: super::RetryPolicy::new(config.sync.max_attempts, config.retry_delay()),
        };
        Self::new(config.sync.enabled, config.period()?, session)
    }

    /// Register the adapter for `table`
    pub fn add_syncer(&mut self, table: impl Into<String>, syncer: Arc<dyn Syncer>) {
        self.registry.bind(table, syncer);
    }

    /// Register an upstream source; an empty `url` marks it passive
    pub fn add_source(&mut self, url: impl Into<String>, store: Arc<Store>, label: impl Into<String>) {
        self.sources.add(url, store, label);
    }

    /// Adapter bound to `table`
    pub fn syncer(&self, table: &str) -> Option<Arc<dyn Syncer>> {
        self.registry.lookup(table)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Table names in sweep order
    pub fn tables(&self) -> &[String] {
        self.registry.tables()
    }

    /// Labels of every registered source, passive ones included
    pub fn registered_sources(&self) -> Vec<String> {
        self.sources.labels()
    }

    /// Sync every registered table from every active source, in order.
    ///
    /// A failing pair is logged and the sweep moves on.
    pub async fn run_sweep(&self) -> SweepReport {
        let sweep_id = Uuid::new_v4();
        let span = tracing::info_span!("sweep", id = %sweep_id);

        async move {
            let started = Instant::now();
            let mut results = Vec::new();

            for source in self.sources.active() {
                for (table, syncer) in self.registry.iter() {
                    tracing::info!(
                        "Syncing external {} for {} on {}/api/sync/{}",
                        source.label,
                        table,
                        source.url.trim_end_matches('/'),
                        table
                    );

                    let outcome = SyncSession::new(source, table, syncer.as_ref(), &self.session)
                        .run()
                        .await;
                    if let Err(e) = &outcome {
                        tracing::error!("Sync of {} from {} failed: {}", table, source.label, e);
                    }

                    results.push(PairResult {
                        source: source.label.clone(),
                        table: table.to_string(),
                        outcome,
                    });
                }
            }

            let report = SweepReport {
                sweep_id,
                results,
                elapsed: started.elapsed(),
            };
            tracing::info!(
                "Sweep finished in {:.3}s: {} ok, {} failed, {} records received, {} new",
                report.elapsed.as_secs_f64(),
                report.succeeded(),
                report.failed(),
                report.received(),
                report.records()
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Sweep once now, then once per period until `shutdown` flips.
    ///
    /// Shutdown is only observed between sweeps.
    pub async fn start_syncing(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.enabled {
            tracing::info!("Data sync is disabled, not pulling from peers");
            return;
        }

        tracing::info!(
            "Starting sync of {} tables from {} sources every {:?}",
            self.registry.len(),
            self.sources.active().count(),
            self.period
        );

        self.run_sweep().await;

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Stopping sync coordinator");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.run_sweep().await;
                }
            }
        }
    }

    /// Serve one page of `table` to a peer
    pub async fn retrieve(&self, table: &str, last: &str, skip: u64, take: u64) -> Result<Page> {
        tracing::info!(
            "Sync request received for {}, last: {}, skip: {}, take: {}",
            table,
            last,
            skip,
            take
        );

        if !self.enabled {
            return Err(Error::SyncDisabled);
        }

        let syncer = self.registry.lookup(table).ok_or_else(|| {
            tracing::info!("Invalid data type in sync request, {}", table);
            Error::TableNotRegistered(table.to_string())
        })?;

        syncer.retrieve(last, skip, take).await
    }
}
