//! Error types for the miner

use fc_03_blockchain::ChainError;
use thiserror::Error;

/// Result type alias for miner operations
pub type Result<T> = std::result::Result<T, MinerError>;

/// Errors returned by the miner's control surface
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MinerError {
    /// No payout address configured
    #[error("No payout address configured")]
    NoPayoutAddress,

    /// `start` called while running
    #[error("Miner already running")]
    AlreadyRunning,

    /// `stop` called while stopped
    #[error("Miner not running")]
    NotRunning,

    /// The worker task panicked or was cancelled
    #[error("Mining worker failed: {0}")]
    Worker(String),

    /// Chain failure surfaced to the caller
    #[error(transparent)]
    Chain(#[from] ChainError),
}
