//! Voting service provider tick rows

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{format_time, sql_bound, time_column, Store};
use crate::error::Result;

/// Pool statistics reported by one VSP at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VspTick {
    pub vsp: String,
    pub time: DateTime<Utc>,
    pub immature: i64,
    pub live: i64,
    pub voted: i64,
    pub missed: i64,
    pub pool_fees: f64,
    pub proportion_live: f64,
    pub proportion_missed: f64,
    pub user_count: i64,
    pub users_active: i64,
}

impl Store {
    /// Time of the newest tick across all VSPs, if any
    pub async fn last_vsp_tick_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let time = conn
            .query_row(
                "SELECT time FROM vsp_tick ORDER BY time DESC LIMIT 1",
                [],
                |row| time_column(row, 0),
            )
            .optional()?;
        Ok(time)
    }

    /// Insert ticks, skipping (vsp, time) pairs already present.
    ///
    /// Returns the number of new rows.
    pub async fn insert_vsp_ticks(&self, ticks: &[VspTick]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO vsp_tick (
                    vsp, time, immature, live, voted, missed, pool_fees,
                    proportion_live, proportion_missed, user_count, users_active
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )?;
            for t in ticks {
                inserted += stmt.execute(params![
                    t.vsp,
                    format_time(&t.time),
                    t.immature,
                    t.live,
                    t.voted,
                    t.missed,
                    t.pool_fees,
                    t.proportion_live,
                    t.proportion_missed,
                    t.user_count,
                    t.users_active,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Page of ticks at or after `since`, ordered by (time, vsp), plus the
    /// number of ticks at or after `since` overall.
    ///
    /// The lower bound is inclusive: ticks sharing the cursor's timestamp may
    /// not all have been received yet.
    pub async fn vsp_ticks_since(
        &self,
        since: Option<DateTime<Utc>>,
        skip: u64,
        take: u64,
    ) -> Result<(Vec<VspTick>, i64)> {
        let since = since.map(|t| format_time(&t));
        let skip = sql_bound("skip", skip)?;
        let take = sql_bound("take", take)?;
        let conn = self.conn.lock().await;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vsp_tick WHERE ?1 IS NULL OR time >= ?1",
            params![since],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT vsp, time, immature, live, voted, missed, pool_fees,
                   proportion_live, proportion_missed, user_count, users_active
            FROM vsp_tick
            WHERE ?1 IS NULL OR time >= ?1
            ORDER BY time, vsp
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let rows = stmt.query_map(params![since, take, skip], |row| {
            Ok(VspTick {
                vsp: row.get(0)?,
                time: time_column(row, 1)?,
                immature: row.get(2)?,
                live: row.get(3)?,
                voted: row.get(4)?,
                missed: row.get(5)?,
                pool_fees: row.get(6)?,
                proportion_live: row.get(7)?,
                proportion_missed: row.get(8)?,
                user_count: row.get(9)?,
                users_active: row.get(10)?,
            })
        })?;

        let mut ticks = Vec::new();
        for result in rows {
            ticks.push(result?);
        }

        Ok((ticks, total))
    }
}
