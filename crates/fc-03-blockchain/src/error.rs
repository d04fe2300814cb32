//! Error types for the blockchain subsystem

use fc_02_chain_store::StoreError;
use shared_types::{short_hex, Hash, OutPoint};
use thiserror::Error;

/// Result type alias for blockchain operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors that can occur while accepting blocks or querying the chain
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Block hash does not meet the proof-of-work target
    #[error("Invalid proof of work for block {}", short_hex(.hash))]
    InvalidProofOfWork {
        /// Recomputed block hash
        hash: Hash,
    },

    /// A transaction failed verification
    #[error("Invalid transaction {}: {reason}", short_hex(.id))]
    InvalidTransaction {
        /// Transaction id as carried by the transaction
        id: Hash,
        /// What failed
        reason: String,
    },

    /// The block's parent is not stored
    #[error("Unknown parent {} for block {}", short_hex(.parent), short_hex(.hash))]
    UnknownParent {
        /// Block hash
        hash: Hash,
        /// Missing parent hash
        parent: Hash,
    },

    /// Block height is not parent height + 1
    #[error("Invalid height: expected {expected}, found {found}")]
    InvalidHeight {
        /// Parent height + 1
        expected: u64,
        /// Height carried by the block
        found: u64,
    },

    /// A coinbase appears anywhere but index 0
    #[error("Coinbase transaction at index {index}")]
    MisplacedCoinbase {
        /// Position of the offending coinbase
        index: usize,
    },

    /// Block carries more transactions than allowed
    #[error("Block carries {count} transactions, limit is {max}")]
    OversizedBlock {
        /// Transactions in the block
        count: usize,
        /// Configured limit
        max: usize,
    },

    /// An output is spent twice on the same branch
    #[error("Double spend of {outpoint} by transaction {}", short_hex(.txid))]
    DoubleSpend {
        /// Spending transaction
        txid: Hash,
        /// Output spent twice
        outpoint: OutPoint,
    },

    /// A locally assembled candidate failed verification
    #[error("Local candidate rejected: {0}")]
    LocalInvariant(String),

    /// The head moved while a candidate was being mined
    #[error("Head moved while mining on {}", short_hex(.parent))]
    StaleCandidate {
        /// Head the candidate was built on
        parent: Hash,
    },

    /// The proof-of-work search was interrupted
    #[error("Proof-of-work search interrupted")]
    Interrupted,

    /// Storage read/write failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// A block referenced by the walked branch is missing from the store
    #[error("Block {} missing from store", short_hex(.hash))]
    MissingBlock {
        /// Hash that could not be loaded
        hash: Hash,
    },

    /// The head read back after writing genesis is not the genesis block
    #[error("Genesis write lost: expected head {}, found {}", short_hex(.expected), short_hex(.found))]
    GenesisMismatch {
        /// Freshly mined genesis hash
        expected: Hash,
        /// Head found in the store
        found: Hash,
    },

    /// Requested height is above the head
    #[error("Height {requested} is above head height {head}")]
    HeightAboveHead {
        /// Requested height
        requested: u64,
        /// Current head height
        head: u64,
    },

    /// Not enough spendable value for a transfer
    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds {
        /// Requested amount
        needed: u64,
        /// Spendable value found
        available: u64,
    },

    /// The chain has not been bootstrapped
    #[error("Chain not bootstrapped")]
    Uninitialized,
}

impl ChainError {
    /// Whether this error rejects remote input, as opposed to a local failure.
    ///
    /// Rejections are logged and skipped by the sync pipeline. Other errors
    /// indicate storage trouble or misuse.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidProofOfWork { .. }
                | Self::InvalidTransaction { .. }
                | Self::UnknownParent { .. }
                | Self::InvalidHeight { .. }
                | Self::MisplacedCoinbase { .. }
                | Self::OversizedBlock { .. }
                | Self::DoubleSpend { .. }
        )
    }

    pub(crate) fn invalid_tx(id: Hash, reason: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            id,
            reason: reason.into(),
        }
    }
}

/// `insert_batch` stopped at the first failing block.
///
/// Blocks before `index` remain committed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Batch insert failed at index {index}: {source}")]
pub struct BatchInsertError {
    /// Position of the first failing block
    pub index: usize,
    /// Why it failed
    pub source: ChainError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_classified() {
        assert!(ChainError::InvalidProofOfWork { hash: [0; 32] }.is_rejection());
        assert!(ChainError::MisplacedCoinbase { index: 2 }.is_rejection());
        assert!(!ChainError::Interrupted.is_rejection());
        assert!(!ChainError::Uninitialized.is_rejection());
    }

    #[test]
    fn test_messages_use_short_hashes() {
        let err = ChainError::InvalidProofOfWork { hash: [0xab; 32] };
        assert_eq!(err.to_string(), "Invalid proof of work for block abababababababab");
    }
}
