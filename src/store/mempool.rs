//! Mempool snapshot rows

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{format_time, sql_bound, time_column, Store};
use crate::error::Result;

/// Aggregate state of the mempool at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MempoolSnapshot {
    pub time: DateTime<Utc>,
    pub first_seen_time: DateTime<Utc>,
    pub number_of_transactions: i64,
    pub voters: i64,
    pub tickets: i64,
    pub revocations: i64,
    pub size: i64,
    pub total_fee: f64,
    pub total: f64,
}

impl Store {
    /// Time of the newest mempool snapshot, if any
    pub async fn last_mempool_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let time = conn
            .query_row(
                "SELECT time FROM mempool ORDER BY time DESC LIMIT 1",
                [],
                |row| time_column(row, 0),
            )
            .optional()?;
        Ok(time)
    }

    /// Insert snapshots, skipping times already present.
    ///
    /// Returns the number of new rows.
    pub async fn insert_mempool(&self, snapshots: &[MempoolSnapshot]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO mempool (
                    time, first_seen_time, number_of_transactions, voters,
                    tickets, revocations, size, total_fee, total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for s in snapshots {
                inserted += stmt.execute(params![
                    format_time(&s.time),
                    format_time(&s.first_seen_time),
                    s.number_of_transactions,
                    s.voters,
                    s.tickets,
                    s.revocations,
                    s.size,
                    s.total_fee,
                    s.total,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Page of snapshots newer than `after`, oldest first, plus the number of
    /// snapshots newer than `after` overall
    pub async fn mempool_after(
        &self,
        after: Option<DateTime<Utc>>,
        skip: u64,
        take: u64,
    ) -> Result<(Vec<MempoolSnapshot>, i64)> {
        let after = after.map(|t| format_time(&t));
        let skip = sql_bound("skip", skip)?;
        let take = sql_bound("take", take)?;
        let conn = self.conn.lock().await;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mempool WHERE ?1 IS NULL OR time > ?1",
            params![after],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT time, first_seen_time, number_of_transactions, voters,
                   tickets, revocations, size, total_fee, total
            FROM mempool
            WHERE ?1 IS NULL OR time > ?1
            ORDER BY time
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let rows = stmt.query_map(params![after, take, skip], |row| {
            Ok(MempoolSnapshot {
                time: time_column(row, 0)?,
                first_seen_time: time_column(row, 1)?,
                number_of_transactions: row.get(2)?,
                voters: row.get(3)?,
                tickets: row.get(4)?,
                revocations: row.get(5)?,
                size: row.get(6)?,
                total_fee: row.get(7)?,
                total: row.get(8)?,
            })
        })?;

        let mut snapshots = Vec::new();
        for result in rows {
            snapshots.push(result?);
        }

        Ok((snapshots, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn snapshot(minute: i64) -> MempoolSnapshot {
        let time = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute);
        MempoolSnapshot {
            time,
            first_seen_time: time - Duration::seconds(30),
            number_of_transactions: 40 + minute,
            voters: 5,
            tickets: 3,
            revocations: 0,
            size: 54205,
            total_fee: 0.003671,
            total: 123.5,
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = Store::open_in_memory("local").unwrap();
        let rows: Vec<_> = (0..5).map(snapshot).collect();

        assert_eq!(store.insert_mempool(&rows).await.unwrap(), 5);
        assert_eq!(store.insert_mempool(&rows).await.unwrap(), 0);
        assert_eq!(store.row_count("mempool").await.unwrap(), 5);
        assert_eq!(store.last_mempool_time().await.unwrap(), Some(snapshot(4).time));
    }

    #[tokio::test]
    async fn test_mempool_after_pages() {
        let store = Store::open_in_memory("local").unwrap();
        assert_eq!(store.last_mempool_time().await.unwrap(), None);

        let rows: Vec<_> = (0..10).map(snapshot).collect();
        store.insert_mempool(&rows).await.unwrap();

        let (page, total) = store.mempool_after(Some(snapshot(3).time), 0, 4).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(page.len(), 4);
        assert_eq!(page[0], snapshot(4));

        let (page, _) = store.mempool_after(Some(snapshot(3).time), 4, 4).await.unwrap();
        assert_eq!(page.len(), 2);

        let (page, total) = store.mempool_after(None, 8, 4).await.unwrap();
        assert_eq!(total, 10);
        assert_eq!(page, vec![snapshot(8), snapshot(9)]);
    }

    #[tokio::test]
    async fn test_huge_offset_is_refused_not_wrapped() {
        let store = Store::open_in_memory("local").unwrap();
        let rows: Vec<_> = (0..3).map(snapshot).collect();
        store.insert_mempool(&rows).await.unwrap();

        // 2^63 would wrap to a negative OFFSET, which SQLite reads as 0
        assert!(store.mempool_after(None, 1u64 << 63, 10).await.is_err());
        assert!(store.mempool_after(None, 0, u64::MAX).await.is_err());

        let (page, total) = store.mempool_after(None, i64::MAX as u64, 10).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 3);
    }
}
