//! # Inbound Ports (Driving Ports)

use crate::error::Result;
use async_trait::async_trait;
use shared_types::KeyHash;

/// Snapshot of the miner's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinerStatus {
    /// Whether the worker is running.
    pub running: bool,
    /// Key hash paid by coinbases, set while running.
    pub payout: Option<KeyHash>,
    /// Blocks appended since the miner was created.
    pub blocks_mined: u64,
    /// Candidates discarded after a failed append.
    pub candidates_discarded: u64,
    /// Transactions waiting to be mined.
    pub queued_transactions: usize,
}

/// Control surface of the miner.
#[async_trait]
pub trait MiningService: Send + Sync {
    /// Start mining, paying coinbases to `payout`.
    async fn start(&self, payout: KeyHash) -> Result<()>;

    /// Stop mining and wait for the worker to exit.
    async fn stop(&self) -> Result<()>;

    /// Current status.
    fn status(&self) -> MinerStatus;
}
