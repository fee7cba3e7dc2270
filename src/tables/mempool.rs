//! Mempool snapshot syncer
//!
//! The cursor is the time of the newest local snapshot; peers serve the
//! snapshots strictly after it.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::network::PeerClient;
use crate::store::{format_time, parse_time_cursor, MempoolSnapshot, Store, MEMPOOL_TABLE};
use crate::sync::{Page, Records, Syncer};

/// Syncer for the `mempool` table
pub struct MempoolSyncer {
    /// Store served to peers
    local: Arc<Store>,
    client: PeerClient,
}

impl MempoolSyncer {
    pub fn new(local: Arc<Store>, client: PeerClient) -> Self {
        Self { local, client }
    }
}

#[async_trait::async_trait]
impl Syncer for MempoolSyncer {
    async fn last_entry(&self, store: &Store) -> Result<String> {
        let last = store.last_mempool_time().await?;
        Ok(last.map_or_else(|| "0".to_string(), |t| format_time(&t)))
    }

    async fn collect(&self, url: &str) -> Result<Page> {
        self.client.fetch_page(url).await
    }

    async fn retrieve(&self, cursor: &str, skip: u64, take: u64) -> Result<Page> {
        let after = match parse_time_cursor(cursor) {
            Ok(after) => after,
            Err(e) => return Ok(Page::failure(e.to_string())),
        };

        match self.local.mempool_after(after, skip, take).await {
            Ok((snapshots, total)) => Page::from_rows(&snapshots, total),
            Err(e) => {
                tracing::error!("Error in fetching mempool data for sync, {}", e);
                Ok(Page::failure(e.to_string()))
            }
        }
    }

    async fn append(&self, store: &Store, records: &Records) -> Result<usize> {
        let snapshots: Vec<MempoolSnapshot> = records.decode().map_err(|e| Error::Persistence {
            table: MEMPOOL_TABLE.to_string(),
            reason: format!("error in decoding the received mempool data, {}", e),
        })?;

        let inserted = store.insert_mempool(&snapshots).await?;
        tracing::debug!(
            "Stored {} of {} mempool snapshots from {}",
            inserted,
            snapshots.len(),
            store.label()
        );
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::fixtures::snapshot;
    use std::time::Duration;

    fn syncer(local: Arc<Store>) -> MempoolSyncer {
        let client = PeerClient::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        MempoolSyncer::new(local, client)
    }

    #[tokio::test]
    async fn test_last_entry_of_empty_store() {
        let local = Arc::new(Store::open_in_memory("local").unwrap());
        let syncer = syncer(Arc::clone(&local));

        assert_eq!(syncer.last_entry(&local).await.unwrap(), "0");

        local.insert_mempool(&[snapshot(0), snapshot(7)]).await.unwrap();
        assert_eq!(syncer.last_entry(&local).await.unwrap(), "2023-01-01T00:07:00.000Z");
    }

    #[tokio::test]
    async fn test_retrieve_then_append_into_peer_store() {
        let local = Arc::new(Store::open_in_memory("local").unwrap());
        let rows: Vec<_> = (0..5).map(snapshot).collect();
        local.insert_mempool(&rows).await.unwrap();
        let syncer = syncer(Arc::clone(&local));

        let peer = Store::open_in_memory("peer").unwrap();
        peer.insert_mempool(&rows[..2]).await.unwrap();
        let cursor = syncer.last_entry(&peer).await.unwrap();

        let page = syncer.retrieve(&cursor, 0, 1000).await.unwrap();
        assert!(page.success);
        assert_eq!(page.total_count, Some(3));

        let appended = syncer.append(&peer, page.records.as_ref().unwrap()).await.unwrap();
        assert_eq!(appended, 3);
        assert_eq!(peer.row_count(MEMPOOL_TABLE).await.unwrap(), 5);

        // Past the end: no records, count still attached
        let page = syncer.retrieve(&cursor, 1000, 1000).await.unwrap();
        assert!(page.records.is_none());
        assert_eq!(page.total_count, Some(3));
    }

    #[tokio::test]
    async fn test_retrieve_rejects_bad_cursor() {
        let local = Arc::new(Store::open_in_memory("local").unwrap());
        let page = syncer(local).retrieve("last tuesday", 0, 10).await.unwrap();

        assert!(!page.success);
        assert!(page.message.unwrap().contains("invalid timestamp"));
    }

    #[tokio::test]
    async fn test_append_rejects_foreign_rows() {
        let local = Arc::new(Store::open_in_memory("local").unwrap());
        let records = Records::from_rows(&["not a snapshot"]).unwrap();

        let err = syncer(Arc::clone(&local)).append(&local, &records).await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }
}
