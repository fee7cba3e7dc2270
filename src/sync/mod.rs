//! Table Replication Module
//!
//! Pull-based, resumable replication of table-shaped data between instances.
//! Each table plugs in through a [`Syncer`]; the [`SyncCoordinator`] sweeps
//! every registered table from every active source on a fixed schedule and
//! answers the same protocol for peers pulling from this instance.

mod coordinator;
mod registry;
mod session;

pub use coordinator::{PairResult, SweepReport, SyncCoordinator};
pub use registry::{Registry, SourceDescriptor, SourceSet};
pub use session::{Completion, RetryPolicy, SessionConfig, SyncOutcome, SyncSession};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::Result;
use crate::store::Store;

/// Default number of records requested per page
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

/// Largest page a peer may request; larger requests are rejected, not truncated
pub const MAX_PAGE_SIZE: u64 = 10_000;

/// Per-table replication plug-in.
///
/// The coordinator drives these four operations without knowing the shape
/// of the table's rows.
#[async_trait::async_trait]
pub trait Syncer: Send + Sync {
    /// Marker of the newest record already persisted in `store`
    async fn last_entry(&self, store: &Store) -> Result<String>;

    /// Fetch one page from a peer; `url` is fully composed by the caller
    async fn collect(&self, url: &str) -> Result<Page>;

    /// Serve one page of this instance's rows after `cursor`
    async fn retrieve(&self, cursor: &str, skip: u64, take: u64) -> Result<Page>;

    /// Persist a received batch into `store`, returning the number of new rows
    async fn append(&self, store: &Store, records: &Records) -> Result<usize>;
}

/// One response of the sync protocol.
///
/// `{"success": bool, "message": string?, "records": array|null, "total_count": int?}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Records>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<i64>,
}

impl Page {
    /// Successful page carrying `rows`.
    ///
    /// An empty slice produces a page without records.
    pub fn from_rows<T: Serialize>(rows: &[T], total_count: i64) -> Result<Self> {
        let records = if rows.is_empty() {
            None
        } else {
            Some(Records::from_rows(rows)?)
        };

        Ok(Self {
            success: true,
            message: None,
            records,
            total_count: Some(total_count),
        })
    }

    /// Page telling the caller it already has everything
    pub fn up_to_date() -> Self {
        Self {
            success: true,
            total_count: Some(0),
            ..Default::default()
        }
    }

    /// Rejected request; never retried by the caller
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// True when the page carries no rows
    pub fn is_empty(&self) -> bool {
        self.records.as_ref().map_or(true, Records::is_empty)
    }
}

/// Serialized JSON array of table rows.
///
/// Passed between peers and adapters untouched; only the owning adapter
/// decodes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Records(Box<RawValue>);

impl Records {
    /// Serialize rows into a payload
    pub fn from_rows<T: Serialize>(rows: &[T]) -> Result<Self> {
        Ok(Self(serde_json::value::to_raw_value(rows)?))
    }

    /// Decode the payload into typed rows
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        Ok(serde_json::from_str(self.0.get())?)
    }

    /// True for `null` and `[]`
    pub fn is_empty(&self) -> bool {
        let raw = self.0.get().trim();
        match raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            Some(inner) => inner.trim().is_empty(),
            None => raw == "null",
        }
    }

    /// Number of rows in the payload, without decoding them
    pub fn len(&self) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let rows: Vec<&RawValue> = serde_json::from_str(self.0.get())?;
        Ok(rows.len())
    }

    /// Raw JSON text
    pub fn as_str(&self) -> &str {
        self.0.get()
    }
}
