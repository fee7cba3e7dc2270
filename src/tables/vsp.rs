//! VSP tick syncer
//!
//! Several providers report at the same instant, so the served range starts
//! at the cursor time inclusively and duplicates are dropped on insert.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::network::PeerClient;
use crate::store::{format_time, parse_time_cursor, Store, VspTick, VSP_TICK_TABLE};
use crate::sync::{Page, Records, Syncer};

/// Syncer for the `vsp_tick` table
pub struct VspTickSyncer {
    local: Arc<Store>,
    client: PeerClient,
}

impl VspTickSyncer {
    pub fn new(local: Arc<Store>, client: PeerClient) -> Self {
        Self { local, client }
    }
}

#[async_trait::async_trait]
impl Syncer for VspTickSyncer {
    async fn last_entry(&self, store: &Store) -> Result<String> {
        let last = store.last_vsp_tick_time().await?;
        Ok(last.map_or_else(|| "0".to_string(), |t| format_time(&t)))
    }

    async fn collect(&self, url: &str) -> Result<Page> {
        self.client.fetch_page(url).await
    }

    async fn retrieve(&self, cursor: &str, skip: u64, take: u64) -> Result<Page> {
        let since = match parse_time_cursor(cursor) {
            Ok(since) => since,
            Err(e) => return Ok(Page::failure(e.to_string())),
        };

        match self.local.vsp_ticks_since(since, skip, take).await {
            Ok((ticks, total)) => Page::from_rows(&ticks, total),
            Err(e) => {
                tracing::error!("Error in fetching vsp ticks for sync, {}", e);
                Ok(Page::failure(e.to_string()))
            }
        }
    }

    async fn append(&self, store: &Store, records: &Records) -> Result<usize> {
        let ticks: Vec<VspTick> = records.decode().map_err(|e| Error::Persistence {
            table: VSP_TICK_TABLE.to_string(),
            reason: format!("error in decoding the received vsp data, {}", e),
        })?;

        store.insert_vsp_ticks(&ticks).await
    }
}
