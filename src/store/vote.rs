//! Vote receive rows

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{format_time, sql_bound, time_column, Store};
use crate::error::Result;

/// A vote as first seen by an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub hash: String,
    pub receive_time: DateTime<Utc>,
    pub targeted_block_time: DateTime<Utc>,
    pub block_receive_time: DateTime<Utc>,
    /// Height of the block being voted on
    pub voting_on: i64,
    pub block_hash: String,
    pub validator_id: i64,
    pub validity: String,
}

impl Store {
    /// Receive time of the newest stored vote, if any
    pub async fn last_vote_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let time = conn
            .query_row(
                "SELECT receive_time FROM vote ORDER BY receive_time DESC LIMIT 1",
                [],
                |row| time_column(row, 0),
            )
            .optional()?;
        Ok(time)
    }

    /// Insert votes, skipping hashes already present.
    ///
    /// Returns the number of new rows.
    pub async fn insert_votes(&self, votes: &[Vote]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO vote (
                    hash, receive_time, targeted_block_time, block_receive_time,
                    voting_on, block_hash, validator_id, validity
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for v in votes {
                inserted += stmt.execute(params![
                    v.hash,
                    format_time(&v.receive_time),
                    format_time(&v.targeted_block_time),
                    format_time(&v.block_receive_time),
                    v.voting_on,
                    v.block_hash,
                    v.validator_id,
                    v.validity,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Page of votes received at or after `since`, ordered by (receive time,
    /// hash), plus the number of such votes overall
    pub async fn votes_since(
        &self,
        since: Option<DateTime<Utc>>,
        skip: u64,
        take: u64,
    ) -> Result<(Vec<Vote>, i64)> {
        let since = since.map(|t| format_time(&t));
        let skip = sql_bound("skip", skip)?;
        let take = sql_bound("take", take)?;
        let conn = self.conn.lock().await;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vote WHERE ?1 IS NULL OR receive_time >= ?1",
            params![since],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT hash, receive_time, targeted_block_time, block_receive_time,
                    voting_on, block_hash, validator_id, validity
             FROM vote
             WHERE ?1 IS NULL OR receive_time >= ?1
             ORDER BY receive_time, hash
             LIMIT ?2 OFFSET ?3",
        )?;
        let votes = stmt
            .query_map(params![since, take, skip], |row| {
                Ok(Vote {
                    hash: row.get(0)?,
                    receive_time: time_column(row, 1)?,
                    targeted_block_time: time_column(row, 2)?,
                    block_receive_time: time_column(row, 3)?,
                    voting_on: row.get(4)?,
                    block_hash: row.get(5)?,
                    validator_id: row.get(6)?,
                    validity: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((votes, total))
    }
}
