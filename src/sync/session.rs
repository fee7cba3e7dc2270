//! Sync Session
//!
//! Replicates one table from one source into the source's local store,
//! resuming after the newest record already persisted there.

use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::Url;

use super::registry::SourceDescriptor;
use super::{Page, Syncer, DEFAULT_PAGE_SIZE};
use crate::error::{Error, Result};

/// Bounded retry of a single page fetch
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per page, first one included
    pub max_attempts: u32,
    /// Base delay before a retry
    pub delay: Duration,
    /// Add up to 25% random jitter to the delay
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and delay
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            jitter: true,
        }
    }

    /// Retry immediately, used by tests and local tooling
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay to wait before the given attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.delay.is_zero() {
            return Duration::ZERO;
        }

        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.0..0.25);
            self.delay + self.delay.mul_f64(factor)
        } else {
            self.delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Settings shared by every session of a coordinator
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Records requested per page
    pub page_size: u64,
    /// Fetch retry policy
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

/// How a successful session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Empty page with no remaining rows reported
    UpToDate,
    /// Empty page while the source still reports `total_count` rows
    FinalPage { total_count: i64 },
}

/// Result of a successful session
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub completion: Completion,
    /// Non-empty pages handed to the adapter
    pub pages: u64,
    /// Rows received from the source
    pub received: usize,
    /// New rows persisted; lower than `received` when rows were already present
    pub records: usize,
    pub elapsed: Duration,
}

/// Replication of one (source, table) pair
pub struct SyncSession<'a> {
    source: &'a SourceDescriptor,
    table: &'a str,
    syncer: &'a dyn Syncer,
    config: &'a SessionConfig,
}

impl<'a> SyncSession<'a> {
    pub fn new(
        source: &'a SourceDescriptor,
        table: &'a str,
        syncer: &'a dyn Syncer,
        config: &'a SessionConfig,
    ) -> Self {
        Self {
            source,
            table,
            syncer,
            config,
        }
    }

    /// Pull pages until the source signals exhaustion.
    ///
    /// The cursor is resolved once; later pages only move the offset.
    pub async fn run(&self) -> Result<SyncOutcome> {
        let started = Instant::now();

        let cursor = self
            .syncer
            .last_entry(&self.source.store)
            .await
            .map_err(|e| Error::CursorResolution {
                table: self.table.to_string(),
                reason: e.to_string(),
            })?;

        let take = self.config.page_size;
        let mut skip = 0u64;
        let mut pages = 0u64;
        let mut received = 0usize;
        let mut records = 0usize;

        loop {
            let url = self.page_url(&cursor, skip)?;
            tracing::info!("Syncing {} data from {}", self.table, url);

            let page = self.fetch_page(&url).await?;
            if !page.success {
                return Err(Error::Protocol(
                    page.message.unwrap_or_else(|| format!("{} rejected the request", url)),
                ));
            }

            let batch = match page.records {
                Some(batch) if !batch.is_empty() => batch,
                _ => {
                    let elapsed = started.elapsed();
                    let total_count = page.total_count.unwrap_or(0);

                    if total_count == 0 {
                        tracing::info!(
                            "{} from {} is up to date ({} received, {} new)",
                            self.table,
                            self.source.label,
                            received,
                            records
                        );
                        return Ok(SyncOutcome {
                            completion: Completion::UpToDate,
                            pages,
                            received,
                            records,
                            elapsed,
                        });
                    }

                    tracing::info!(
                        "Synced {} {} records ({} new) from {} in {:.3} seconds",
                        received,
                        self.table,
                        records,
                        self.source.url,
                        elapsed.as_secs_f64()
                    );
                    return Ok(SyncOutcome {
                        completion: Completion::FinalPage { total_count },
                        pages,
                        received,
                        records,
                        elapsed,
                    });
                }
            };

            let batch_len = batch.len().map_err(|e| {
                Error::Protocol(format!("{} records from {} are not a list, {}", self.table, url, e))
            })?;

            let appended = self
                .syncer
                .append(&self.source.store, &batch)
                .await
                .map_err(|e| match e {
                    Error::Persistence { .. } => e,
                    other => Error::Persistence {
                        table: self.table.to_string(),
                        reason: other.to_string(),
                    },
                })?;
            tracing::debug!("Persisted {} {} records at offset {}", appended, self.table, skip);

            pages += 1;
            received += batch_len;
            records += appended;
            skip += take;
        }
    }

    /// `{base}/api/sync/{table}?last={cursor}&skip={skip}&take={take}`
    fn page_url(&self, cursor: &str, skip: u64) -> Result<String> {
        let mut url = Url::parse(self.source.url.trim_end_matches('/')).map_err(|e| {
            Error::Config(format!("invalid url for source {}: {}", self.source.label, e))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                Error::Config(format!("source {} url cannot be a base", self.source.label))
            })?
            .pop_if_empty()
            .extend(["api", "sync", self.table]);

        url.query_pairs_mut()
            .append_pair("last", cursor)
            .append_pair("skip", &skip.to_string())
            .append_pair("take", &self.config.page_size.to_string());

        Ok(url.into())
    }

    /// Fetch one page, retrying transport and decoding failures.
    ///
    /// The attempt budget is per page.
    async fn fetch_page(&self, url: &str) -> Result<Page> {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.syncer.collect(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    tracing::warn!(
                        "Sync {} data from {} failed, {}. Retrying...",
                        self.table,
                        url,
                        e
                    );
                    tokio::time::sleep(retry.delay_for_attempt(attempt + 1)).await;
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    return Err(Error::Transport {
                        url: url.to_string(),
                        reason: format!("{} (gave up after {} attempts)", e, attempt),
                    });
                }
            }
        }
    }
}
