//! Network Module
//!
//! Outbound HTTP communication with peer instances.

mod client;

pub use client::PeerClient;
