//! Two instances talking over real HTTP: one serves its tables, the other
//! pulls them into a per-source store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use tablesync::api::HttpServer;
use tablesync::config::{ApiConfig, TableSyncConfig};
use tablesync::network::PeerClient;
use tablesync::store::{
    Block, MempoolSnapshot, Store, Vote, VspTick, BLOCK_TABLE, MEMPOOL_TABLE, VOTE_TABLE,
    VSP_TICK_TABLE,
};
use tablesync::sync::{Completion, RetryPolicy, SessionConfig, SyncCoordinator, MAX_PAGE_SIZE};
use tablesync::Error;

fn snapshot(minute: i64) -> MempoolSnapshot {
    let time = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minute);
    MempoolSnapshot {
        time,
        first_seen_time: time,
        number_of_transactions: 30 + minute,
        voters: 5,
        tickets: 1,
        revocations: 0,
        size: 20_000,
        total_fee: 0.0021,
        total: 41.5,
    }
}

fn tick(vsp: &str, hour: i64) -> VspTick {
    VspTick {
        vsp: vsp.to_string(),
        time: Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(hour),
        immature: 4,
        live: 200,
        voted: 900,
        missed: 1,
        pool_fees: 1.5,
        proportion_live: 0.004,
        proportion_missed: 0.001,
        user_count: 80,
        users_active: 75,
    }
}

fn block(height: i64) -> Block {
    let internal = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(5 * height);
    Block {
        block_height: 800_000 + height,
        block_hash: format!("{:064x}", height),
        block_receive_time: internal + chrono::Duration::milliseconds(900),
        block_internal_time: internal,
    }
}

fn vote(hash: &str, millis: i64) -> Vote {
    let receive_time = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(millis);
    Vote {
        hash: hash.to_string(),
        receive_time,
        targeted_block_time: receive_time,
        block_receive_time: receive_time,
        voting_on: 800_001,
        block_hash: format!("{:064x}", 1),
        validator_id: 3,
        validity: "Valid".to_string(),
    }
}

fn client() -> PeerClient {
    PeerClient::new(Duration::from_secs(2), Duration::from_secs(5)).unwrap()
}

/// Spawn an upstream instance holding 5 snapshots, 4 ticks, 3 blocks and 3 votes
async fn spawn_upstream(enabled: bool) -> SocketAddr {
    let store = Arc::new(Store::open_in_memory("upstream").unwrap());
    let snapshots: Vec<_> = (0..5).map(snapshot).collect();
    store.insert_mempool(&snapshots).await.unwrap();
    // Two pools share the newest timestamp
    store
        .insert_vsp_ticks(&[tick("alpha", 0), tick("beta", 0), tick("alpha", 1), tick("beta", 1)])
        .await
        .unwrap();
    store.insert_blocks(&[block(0), block(1), block(2)]).await.unwrap();
    // The newest vote shares its second with no other vote
    store
        .insert_votes(&[vote("a", 0), vote("b", 400), vote("c", 1200)])
        .await
        .unwrap();

    let mut coordinator =
        SyncCoordinator::new(enabled, Duration::from_secs(3600), SessionConfig::default()).unwrap();
    tablesync::tables::register_all(&mut coordinator, store, client());

    let server = HttpServer::new(ApiConfig::default(), Arc::new(coordinator));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { server.serve(listener).await });

    addr
}

fn downstream(upstream: SocketAddr, peer_store: Arc<Store>) -> SyncCoordinator {
    downstream_with_page_size(upstream, peer_store, 2)
}

fn downstream_with_page_size(upstream: SocketAddr, peer_store: Arc<Store>, page_size: u64) -> SyncCoordinator {
    let session = SessionConfig {
        page_size,
        retry: RetryPolicy::immediate(3),
    };
    let mut coordinator = SyncCoordinator::new(true, Duration::from_secs(3600), session).unwrap();
    let local = Arc::new(Store::open_in_memory("local").unwrap());
    tablesync::tables::register_all(&mut coordinator, local, client());
    coordinator.add_source(format!("http://{}", upstream), peer_store, "upstream");
    coordinator
}

#[tokio::test]
async fn test_pulls_every_table_from_peer() {
    let addr = spawn_upstream(true).await;
    let dir = tempfile::tempdir().unwrap();
    let peer_store = Arc::new(Store::open(&dir.path().join("upstream.db"), "upstream").unwrap());
    let coordinator = downstream(addr, Arc::clone(&peer_store));

    let report = coordinator.run_sweep().await;

    assert_eq!(report.failed(), 0, "{:?}", report.results);
    assert_eq!(report.records(), 15);
    assert_eq!(report.received(), 15);
    assert_eq!(peer_store.row_count(MEMPOOL_TABLE).await.unwrap(), 5);
    assert_eq!(peer_store.row_count(VSP_TICK_TABLE).await.unwrap(), 4);
    assert_eq!(peer_store.row_count(BLOCK_TABLE).await.unwrap(), 3);
    assert_eq!(peer_store.row_count(VOTE_TABLE).await.unwrap(), 3);

    // Blocks are processed as they arrive
    assert_eq!(peer_store.last_block_height().await.unwrap(), Some(800_002));
    assert_eq!(peer_store.block_delay(800_002).await.unwrap(), Some(0.9));

    // 5 snapshots at 2 per page
    let mempool = report.results[0].outcome.as_ref().unwrap();
    assert_eq!(mempool.pages, 3);

    let newest = peer_store.last_mempool_time().await.unwrap();
    assert_eq!(newest, Some(snapshot(4).time));
}

#[tokio::test]
async fn test_second_sweep_adds_nothing() {
    let addr = spawn_upstream(true).await;
    let dir = tempfile::tempdir().unwrap();
    let peer_store = Arc::new(Store::open(&dir.path().join("upstream.db"), "upstream").unwrap());
    let coordinator = downstream(addr, Arc::clone(&peer_store));

    coordinator.run_sweep().await;
    let report = coordinator.run_sweep().await;

    assert_eq!(report.failed(), 0);
    assert_eq!(report.records(), 0);
    // Inclusive cursors re-send the newest tick group and the newest vote second
    assert_eq!(report.received(), 3);
    assert_eq!(peer_store.row_count(MEMPOOL_TABLE).await.unwrap(), 5);
    assert_eq!(peer_store.row_count(VSP_TICK_TABLE).await.unwrap(), 4);
    assert_eq!(peer_store.row_count(BLOCK_TABLE).await.unwrap(), 3);
    assert_eq!(peer_store.row_count(VOTE_TABLE).await.unwrap(), 3);

    let mempool = report.results[0].outcome.as_ref().unwrap();
    assert_eq!(mempool.completion, Completion::UpToDate);
}

#[tokio::test]
async fn test_disabled_peer_is_rejection() {
    let addr = spawn_upstream(false).await;
    let peer_store = Arc::new(Store::open_in_memory("upstream").unwrap());
    let coordinator = downstream(addr, Arc::clone(&peer_store));

    let report = coordinator.run_sweep().await;

    assert_eq!(report.failed(), 4);
    for result in &report.results {
        match &result.outcome {
            Err(Error::Protocol(message)) => {
                assert!(message.contains("data sharing is disabled"), "{}", message)
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
    assert_eq!(peer_store.row_count(MEMPOOL_TABLE).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unreachable_peer_fails_pairs() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let coordinator = downstream(addr, Arc::new(Store::open_in_memory("gone").unwrap()));
    let report = coordinator.run_sweep().await;

    assert_eq!(report.failed(), 4);
    assert!(report
        .results
        .iter()
        .all(|r| matches!(r.outcome, Err(Error::Transport { .. }))));
}

#[tokio::test]
async fn test_oversized_page_is_refused_not_truncated() {
    let toml = format!("[store]\npath = \"x.db\"\n[sync]\npage_size = {}\n", MAX_PAGE_SIZE * 2);
    assert!(TableSyncConfig::from_str(&toml).is_err());

    // A coordinator built by hand still cannot skip rows silently
    let addr = spawn_upstream(true).await;
    let peer_store = Arc::new(Store::open_in_memory("upstream").unwrap());
    let coordinator = downstream_with_page_size(addr, Arc::clone(&peer_store), MAX_PAGE_SIZE * 2);

    let report = coordinator.run_sweep().await;

    assert_eq!(report.failed(), 4);
    assert!(matches!(
        &report.results[0].outcome,
        Err(Error::Protocol(message)) if message.contains("take must be")
    ));
    assert_eq!(peer_store.row_count(MEMPOOL_TABLE).await.unwrap(), 0);
}
