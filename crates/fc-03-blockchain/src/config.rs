//! Configuration for the blockchain subsystem

use shared_types::{sha256, KeyHash};

/// Consensus parameters shared by every node of a network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainConfig {
    /// Maximum value a coinbase may mint.
    pub coinbase_reward: u64,

    /// Maximum transactions per block, coinbase included.
    pub max_block_transactions: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            coinbase_reward: 50,
            max_block_transactions: 64,
        }
    }
}

/// Genesis block parameters.
///
/// Every field feeds the genesis hash, so nodes only agree on a genesis when
/// they share this configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisConfig {
    /// Key hash paid by the genesis coinbase.
    pub payout: KeyHash,

    /// Genesis timestamp (fixed, never the wall clock).
    pub timestamp: u64,

    /// Value minted by the genesis coinbase.
    pub reward: u64,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            payout: sha256(b"forge-chain genesis"),
            timestamp: 1_700_000_000,
            reward: 50,
        }
    }
}
