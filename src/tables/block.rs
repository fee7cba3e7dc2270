//! Block syncer
//!
//! The cursor is the height of the newest local block, as a decimal integer.
//! After every appended batch the propagation delays of the new blocks are
//! derived.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::network::PeerClient;
use crate::store::{Block, Store, BLOCK_TABLE};
use crate::sync::{Page, Records, Syncer};

/// Parse a block height cursor; empty means nothing synced yet
fn parse_height_cursor(cursor: &str) -> Result<i64> {
    let cursor = cursor.trim();
    if cursor.is_empty() {
        return Ok(0);
    }
    cursor
        .parse()
        .map_err(|e| Error::Protocol(format!("invalid block height {:?}: {}", cursor, e)))
}

/// Syncer for the `block` table
pub struct BlockSyncer {
    /// Store served to peers
    local: Arc<Store>,
    client: PeerClient,
}

impl BlockSyncer {
    pub fn new(local: Arc<Store>, client: PeerClient) -> Self {
        Self { local, client }
    }
}

#[async_trait::async_trait]
impl Syncer for BlockSyncer {
    async fn last_entry(&self, store: &Store) -> Result<String> {
        let height = store.last_block_height().await?;
        Ok(height.unwrap_or(0).to_string())
    }

    async fn collect(&self, url: &str) -> Result<Page> {
        self.client.fetch_page(url).await
    }

    async fn retrieve(&self, cursor: &str, skip: u64, take: u64) -> Result<Page> {
        let height = match parse_height_cursor(cursor) {
            Ok(height) => height,
            Err(e) => return Ok(Page::failure(e.to_string())),
        };

        match self.local.blocks_after(height, skip, take).await {
            Ok((blocks, total)) => Page::from_rows(&blocks, total),
            Err(e) => {
                tracing::error!("Error in fetching blocks for sync, {}", e);
                Ok(Page::failure(e.to_string()))
            }
        }
    }

    async fn append(&self, store: &Store, records: &Records) -> Result<usize> {
        let blocks: Vec<Block> = records.decode().map_err(|e| Error::Persistence {
            table: BLOCK_TABLE.to_string(),
            reason: format!("error in decoding the received block data, {}", e),
        })?;

        let inserted = store.insert_blocks(&blocks).await?;

        // Rows are committed; unprocessed blocks are picked up on the next batch
        match store.process_block_entries().await {
            Ok(processed) => tracing::debug!("Updated propagation data for {} blocks", processed),
            Err(e) => tracing::error!("Error in propagation data update for {}, {}", store.label(), e),
        }

        Ok(inserted)
    }
}
