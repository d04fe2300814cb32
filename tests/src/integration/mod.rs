//! # Cross-Subsystem Scenarios
//!
//! Each scenario runs one or more [`NodeRuntime`]s, connected pairwise by a
//! [`ChannelTransport`], and observes them only through their public
//! surfaces.

pub mod chain_sync;
pub mod ledger;

use fc_01_proof_of_work::PowConfig;
use fc_05_chain_sync::{ChannelTransport, SyncConfig};
use node_runtime::{NodeConfig, NodeRuntime};
use shared_types::{KeyHash, PeerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Upper bound for any condition a scenario waits on.
pub const SCENARIO_TIMEOUT: Duration = Duration::from_secs(20);

/// In-memory node at a difficulty that mines in milliseconds.
pub fn node_config() -> NodeConfig {
    NodeConfig {
        pow: PowConfig {
            difficulty_bits: 8,
            interrupt_check_interval: 64,
        },
        sync: SyncConfig::for_testing(),
        ..Default::default()
    }
}

/// Like [`node_config`], mining to `payout`.
pub fn mining_config(payout: KeyHash) -> NodeConfig {
    let mut config = node_config();
    config.mining.enabled = true;
    config.mining.payout = Some(payout);
    config
}

/// Wire `a` and `b` together. Both ends run until either node shuts down.
pub fn link(a: &NodeRuntime, a_id: u8, b: &NodeRuntime, b_id: u8) -> (JoinHandle<()>, JoinHandle<()>) {
    let (a_end, b_end) = ChannelTransport::pair(PeerId([a_id; 32]), PeerId([b_id; 32]));
    (a.connect(Arc::new(a_end)), b.connect(Arc::new(b_end)))
}

/// Poll `condition` every 20ms until it holds or [`SCENARIO_TIMEOUT`] passes.
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + SCENARIO_TIMEOUT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
