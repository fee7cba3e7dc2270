//! Vote syncer
//!
//! The cursor is the receive time of the newest local vote in Unix seconds.
//! Sub-second precision is lost in the cursor, so peers serve votes from the
//! start of that second and already stored hashes are ignored on insert.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::network::PeerClient;
use crate::store::{Store, Vote, VOTE_TABLE};
use crate::sync::{Page, Records, Syncer};

/// Parse a Unix-seconds cursor; empty or `"0"` means nothing synced yet
fn parse_unix_cursor(cursor: &str) -> Result<Option<DateTime<Utc>>> {
    let cursor = cursor.trim();
    if cursor.is_empty() || cursor == "0" {
        return Ok(None);
    }

    let secs: i64 = cursor
        .parse()
        .map_err(|e| Error::Protocol(format!("invalid vote cursor {:?}: {}", cursor, e)))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(Some)
        .ok_or_else(|| Error::Protocol(format!("vote cursor {} is out of range", secs)))
}

/// Syncer for the `vote` table
pub struct VoteSyncer {
    /// Store served to peers
    local: Arc<Store>,
    client: PeerClient,
}

impl VoteSyncer {
    pub fn new(local: Arc<Store>, client: PeerClient) -> Self {
        Self { local, client }
    }
}

#[async_trait::async_trait]
impl Syncer for VoteSyncer {
    async fn last_entry(&self, store: &Store) -> Result<String> {
        let last = store.last_vote_time().await?;
        Ok(last.map_or(0, |t| t.timestamp()).to_string())
    }

    async fn collect(&self, url: &str) -> Result<Page> {
        self.client.fetch_page(url).await
    }

    async fn retrieve(&self, cursor: &str, skip: u64, take: u64) -> Result<Page> {
        let since = match parse_unix_cursor(cursor) {
            Ok(since) => since,
            Err(e) => return Ok(Page::failure(e.to_string())),
        };

        match self.local.votes_since(since, skip, take).await {
            Ok((votes, total)) => Page::from_rows(&votes, total),
            Err(e) => {
                tracing::error!("Error in fetching votes for sync, {}", e);
                Ok(Page::failure(e.to_string()))
            }
        }
    }

    async fn append(&self, store: &Store, records: &Records) -> Result<usize> {
        let votes: Vec<Vote> = records.decode().map_err(|e| Error::Persistence {
            table: VOTE_TABLE.to_string(),
            reason: format!("error in decoding the received vote data, {}", e),
        })?;

        store.insert_votes(&votes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::fixtures::vote;
    use std::time::Duration;

    fn syncer(local: Arc<Store>) -> VoteSyncer {
        let client = PeerClient::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        VoteSyncer::new(local, client)
    }

    #[test]
    fn test_unix_cursor() {
        assert_eq!(parse_unix_cursor("").unwrap(), None);
        assert_eq!(parse_unix_cursor("0").unwrap(), None);
        assert_eq!(
            parse_unix_cursor("1682899200").unwrap(),
            Some(Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap())
        );
        assert!(parse_unix_cursor("yesterday").is_err());
        assert!(parse_unix_cursor(&i64::MAX.to_string()).is_err());
    }

    #[tokio::test]
    async fn test_votes_within_cursor_second_are_not_lost() {
        // Votes 0 and 1 share a second, vote 2 arrives a second later
        let all = [vote("a", 0), vote("b", 400), vote("c", 1200)];
        let local = Arc::new(Store::open_in_memory("local").unwrap());
        local.insert_votes(&all).await.unwrap();
        let syncer = syncer(Arc::clone(&local));

        let peer = Store::open_in_memory("peer").unwrap();
        peer.insert_votes(&all[..1]).await.unwrap();

        let cursor = syncer.last_entry(&peer).await.unwrap();
        assert_eq!(cursor, all[0].receive_time.timestamp().to_string());

        let page = syncer.retrieve(&cursor, 0, 100).await.unwrap();
        assert_eq!(page.total_count, Some(3));
        let appended = syncer.append(&peer, page.records.as_ref().unwrap()).await.unwrap();

        assert_eq!(appended, 2);
        assert_eq!(peer.row_count(VOTE_TABLE).await.unwrap(), 3);
    }
}
