//! Replicated Tables
//!
//! Syncer implementations for the dashboard tables shared between instances.

mod block;
mod mempool;
mod vote;
mod vsp;

pub use block::BlockSyncer;
pub use mempool::MempoolSyncer;
pub use vote::VoteSyncer;
pub use vsp::VspTickSyncer;

use std::sync::Arc;

use crate::network::PeerClient;
use crate::store::{Store, BLOCK_TABLE, MEMPOOL_TABLE, VOTE_TABLE, VSP_TICK_TABLE};
use crate::sync::SyncCoordinator;

/// Register every replicated table, in sweep order
pub fn register_all(coordinator: &mut SyncCoordinator, local: Arc<Store>, client: PeerClient) {
    coordinator.add_syncer(
        MEMPOOL_TABLE,
        Arc::new(MempoolSyncer::new(Arc::clone(&local), client.clone())),
    );
    coordinator.add_syncer(
        VSP_TICK_TABLE,
        Arc::new(VspTickSyncer::new(Arc::clone(&local), client.clone())),
    );
    coordinator.add_syncer(
        BLOCK_TABLE,
        Arc::new(BlockSyncer::new(Arc::clone(&local), client.clone())),
    );
    coordinator.add_syncer(VOTE_TABLE, Arc::new(VoteSyncer::new(local, client)));
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SessionConfig;
    use std::time::Duration;

    #[test]
    fn test_register_all_order() {
        let local = Arc::new(Store::open_in_memory("local").unwrap());
        let client = PeerClient::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let mut coordinator =
            SyncCoordinator::new(true, Duration::from_secs(60), SessionConfig::default()).unwrap();

        register_all(&mut coordinator, local, client);

        assert_eq!(
            coordinator.tables(),
            &[MEMPOOL_TABLE, VSP_TICK_TABLE, BLOCK_TABLE, VOTE_TABLE]
        );
        assert!(coordinator.syncer("mempool").is_some());
        assert!(coordinator.syncer("vote").is_some());
    }
}
