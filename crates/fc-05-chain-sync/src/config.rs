//! Configuration for the sync handler

use std::time::Duration;

/// Protocol version spoken by this node.
pub const PROTOCOL_VERSION: u16 = 1;

/// Sync handler parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Rejected in the handshake unless equal on both sides.
    pub protocol_version: u16,

    /// Rejected in the handshake unless equal on both sides.
    pub network_id: u64,

    /// Hashes requested per `GetHashesFromHeight`, also the ancestor search window.
    pub hash_window: u64,

    /// Blocks requested per `GetBlocks`. Larger requests from peers are malformed.
    pub max_blocks_per_request: usize,

    /// Time allowed for the peer's `Status`.
    pub handshake_timeout: Duration,

    /// Time allowed for a `Hashes` or `Blocks` reply.
    pub response_timeout: Duration,

    /// Period of the forced sync against the best peer.
    pub force_sync_interval: Duration,

    /// Peer count that triggers a sync on connect.
    pub min_desired_peers: usize,

    /// Transaction ids remembered to stop relay loops.
    pub known_tx_cache: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            network_id: 1,
            hash_window: 512,
            max_blocks_per_request: 128,
            handshake_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(10),
            force_sync_interval: Duration::from_secs(10),
            min_desired_peers: 5,
            known_tx_cache: 4096,
        }
    }
}

impl SyncConfig {
    /// Short timeouts and eager syncing for tests.
    pub fn for_testing() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_secs(2),
            force_sync_interval: Duration::from_millis(100),
            min_desired_peers: 1,
            ..Self::default()
        }
    }
}
