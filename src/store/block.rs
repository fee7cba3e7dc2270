//! Block receive rows and their derived propagation delays

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{format_time, sql_bound, time_column, Store};
use crate::error::Result;

/// A block as first seen by an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_height: i64,
    pub block_hash: String,
    /// When this instance received the block
    pub block_receive_time: DateTime<Utc>,
    /// Timestamp in the block header
    pub block_internal_time: DateTime<Utc>,
}

impl Block {
    /// Seconds between the header timestamp and local receipt
    pub fn receive_delay(&self) -> f64 {
        (self.block_receive_time - self.block_internal_time).num_milliseconds() as f64 / 1000.0
    }
}

impl Store {
    /// Height of the newest stored block, if any
    pub async fn last_block_height(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        let height = conn
            .query_row("SELECT MAX(block_height) FROM block", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(height)
    }

    /// Insert blocks, skipping heights already present.
    ///
    /// Returns the number of new rows.
    pub async fn insert_blocks(&self, blocks: &[Block]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO block (block_height, block_hash, block_receive_time, block_internal_time)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for b in blocks {
                inserted += stmt.execute(params![
                    b.block_height,
                    b.block_hash,
                    format_time(&b.block_receive_time),
                    format_time(&b.block_internal_time),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Page of blocks above `height`, lowest first, plus the number of
    /// blocks above `height` overall
    pub async fn blocks_after(&self, height: i64, skip: u64, take: u64) -> Result<(Vec<Block>, i64)> {
        let skip = sql_bound("skip", skip)?;
        let take = sql_bound("take", take)?;
        let conn = self.conn.lock().await;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM block WHERE block_height > ?1",
            params![height],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT block_height, block_hash, block_receive_time, block_internal_time
             FROM block WHERE block_height > ?1
             ORDER BY block_height
             LIMIT ?2 OFFSET ?3",
        )?;
        let blocks = stmt
            .query_map(params![height, take, skip], |row| {
                Ok(Block {
                    block_height: row.get(0)?,
                    block_hash: row.get(1)?,
                    block_receive_time: time_column(row, 2)?,
                    block_internal_time: time_column(row, 3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((blocks, total))
    }

    /// Derive propagation delays for blocks that have none yet.
    ///
    /// Returns the number of blocks processed.
    pub async fn process_block_entries(&self) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let pending = {
            let mut stmt = tx.prepare(
                "SELECT b.block_height, b.block_hash, b.block_receive_time, b.block_internal_time
                 FROM block b
                 LEFT JOIN block_propagation p ON p.block_height = b.block_height
                 WHERE p.block_height IS NULL",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Block {
                    block_height: row.get(0)?,
                    block_hash: row.get(1)?,
                    block_receive_time: time_column(row, 2)?,
                    block_internal_time: time_column(row, 3)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        for block in &pending {
            tx.execute(
                "INSERT INTO block_propagation (block_height, receive_delay) VALUES (?1, ?2)",
                params![block.block_height, block.receive_delay()],
            )?;
        }
        tx.commit()?;
        Ok(pending.len())
    }

    /// Propagation delay recorded for `height`, in seconds
    pub async fn block_delay(&self, height: i64) -> Result<Option<f64>> {
        let conn = self.conn.lock().await;
        let delay = conn
            .query_row(
                "SELECT receive_delay FROM block_propagation WHERE block_height = ?1",
                params![height],
                |row| row.get(0),
            )
            .optional()?;
        Ok(delay)
    }
}
