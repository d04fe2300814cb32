//! Configuration for the miner

/// Miner parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinerConfig {
    /// Transactions per candidate, coinbase included.
    pub max_block_transactions: usize,

    /// Value paid by each coinbase.
    pub coinbase_reward: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            max_block_transactions: 64,
            coinbase_reward: 50,
        }
    }
}
