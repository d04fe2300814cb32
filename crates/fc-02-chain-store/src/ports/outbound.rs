//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the chain store requires from the host application.

use crate::domain::errors::{KVStoreError, SerializationError};
use shared_types::Block;

/// Abstract interface for key-value database operations.
///
/// Production: `RocksDbStore` (node-runtime, `rocksdb` feature)
/// Testing: [`crate::InMemoryKVStore`]
///
/// Methods take `&self`; engines provide their own interior mutability.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either all operations in the batch are applied, or none are.
    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError>;
}

/// Batch operation for atomic writes.
///
/// The chain store only ever adds records, so a batch is a list of puts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put {
        /// Record key.
        key: Vec<u8>,
        /// Record value.
        value: Vec<u8>,
    },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Block encoding used for persisted records.
pub trait BlockSerializer: Send + Sync {
    /// Encode a block.
    fn serialize(&self, block: &Block) -> Result<Vec<u8>, SerializationError>;

    /// Decode a block.
    fn deserialize(&self, data: &[u8]) -> Result<Block, SerializationError>;
}
