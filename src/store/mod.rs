//! Local Store
//!
//! Embedded SQLite storage for replicated tables. Every source gets its own
//! database file, and the primary store holds the rows this instance serves
//! to its peers.

mod block;
mod mempool;
mod vote;
mod vsp;

pub use block::Block;
pub use mempool::MempoolSnapshot;
pub use vote::Vote;
pub use vsp::VspTick;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Table holding mempool snapshots
pub const MEMPOOL_TABLE: &str = "mempool";

/// Table holding voting service provider ticks
pub const VSP_TICK_TABLE: &str = "vsp_tick";

/// Table holding block receive times
pub const BLOCK_TABLE: &str = "block";

/// Table holding vote receive times
pub const VOTE_TABLE: &str = "vote";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mempool (
    time TEXT PRIMARY KEY,
    first_seen_time TEXT NOT NULL,
    number_of_transactions INTEGER NOT NULL,
    voters INTEGER NOT NULL,
    tickets INTEGER NOT NULL,
    revocations INTEGER NOT NULL,
    size INTEGER NOT NULL,
    total_fee REAL NOT NULL,
    total REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS vsp_tick (
    vsp TEXT NOT NULL,
    time TEXT NOT NULL,
    immature INTEGER NOT NULL,
    live INTEGER NOT NULL,
    voted INTEGER NOT NULL,
    missed INTEGER NOT NULL,
    pool_fees REAL NOT NULL,
    proportion_live REAL NOT NULL,
    proportion_missed REAL NOT NULL,
    user_count INTEGER NOT NULL,
    users_active INTEGER NOT NULL,
    PRIMARY KEY (vsp, time)
);

CREATE INDEX IF NOT EXISTS idx_vsp_tick_time ON vsp_tick(time);

CREATE TABLE IF NOT EXISTS block (
    block_height INTEGER PRIMARY KEY,
    block_hash TEXT NOT NULL,
    block_receive_time TEXT NOT NULL,
    block_internal_time TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS block_propagation (
    block_height INTEGER PRIMARY KEY,
    receive_delay REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS vote (
    hash TEXT PRIMARY KEY,
    receive_time TEXT NOT NULL,
    targeted_block_time TEXT NOT NULL,
    block_receive_time TEXT NOT NULL,
    voting_on INTEGER NOT NULL,
    block_hash TEXT NOT NULL,
    validator_id INTEGER NOT NULL,
    validity TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vote_receive_time ON vote(receive_time);
"#;

/// SQLite-backed store for one instance's copy of the replicated tables
pub struct Store {
    /// Database connection
    conn: Mutex<Connection>,
    /// Name of the instance whose rows live here
    label: String,
}

impl Store {
    /// Create or open the store database
    pub fn open(path: &Path, label: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(conn, label.into())
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory(label: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, label.into())
    }

    fn init(conn: Connection, label: String) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("Opened store for {}", label);

        Ok(Self {
            conn: Mutex::new(conn),
            label,
        })
    }

    /// Name of the instance this store mirrors
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Names of the tables kept in this store
    pub fn table_names(&self) -> &'static [&'static str] {
        &[MEMPOOL_TABLE, VSP_TICK_TABLE, BLOCK_TABLE, VOTE_TABLE]
    }

    /// Row count of one of the store's tables
    pub async fn row_count(&self, table: &str) -> Result<u64> {
        if !self.table_names().contains(&table) {
            return Err(Error::TableNotRegistered(table.to_string()));
        }

        let conn = self.conn.lock().await;
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Format a timestamp the way it is stored.
///
/// The width is fixed so that text ordering in SQLite matches time ordering.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored or received RFC 3339 timestamp
pub fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Protocol(format!("invalid timestamp {:?}: {}", value, e)))
}

/// Parse a time-based sync cursor.
///
/// An empty cursor or `"0"` means nothing has been synced yet.
pub fn parse_time_cursor(cursor: &str) -> Result<Option<DateTime<Utc>>> {
    let cursor = cursor.trim();
    if cursor.is_empty() || cursor == "0" {
        return Ok(None);
    }
    parse_time(cursor).map(Some)
}

/// Convert a paging value into an SQLite integer.
///
/// SQLite reads a negative OFFSET as 0 and a negative LIMIT as unbounded, so
/// values past `i64::MAX` are refused instead of wrapped.
pub(crate) fn sql_bound(name: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Protocol(format!("{} {} is out of range", name, value)))
}

pub(crate) fn time_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
