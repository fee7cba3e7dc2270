//! TableSync - Table replication between analytics dashboard instances
//!
//! Lets one deployment pull table-shaped datasets (mempool snapshots, VSP
//! ticks) from other deployments on a fixed schedule, and serve its own
//! tables to them over the same protocol.
//!
//! # Architecture
//!
//! Every table plugs in through a [`sync::Syncer`]. The
//! [`sync::SyncCoordinator`] sweeps each registered table from each active
//! source sequentially, resuming from the newest locally persisted record and
//! paging through the peer's rows until the peer signals exhaustion.
//!
//! # Features
//!
//! - Resumable, cursor-based pulls with per-page bounded retry
//! - Idempotent re-sync through duplicate-ignoring inserts
//! - One local SQLite store per source
//! - HTTP retrieval API so other instances can pull from this one

pub mod config;
pub mod error;
pub mod store;
pub mod sync;
pub mod network;
pub mod api;
pub mod tables;

pub use config::TableSyncConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::TableSyncConfig;
    pub use crate::error::{Error, Result};
    pub use crate::store::Store;
    pub use crate::sync::{Page, Records, SyncCoordinator, Syncer};
    pub use crate::network::PeerClient;
    pub use crate::api::HttpServer;
}
