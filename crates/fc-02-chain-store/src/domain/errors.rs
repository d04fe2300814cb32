//! Error types for the chain store.

use thiserror::Error;

/// Errors raised by a key-value engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError {
        /// Engine message.
        message: String,
    },
    /// The engine detected corrupted data.
    #[error("KV store corruption: {message}")]
    CorruptionError {
        /// Engine message.
        message: String,
    },
}

/// Block encode/decode failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Serialization error: {message}")]
pub struct SerializationError {
    /// Codec message.
    pub message: String,
}

/// Errors surfaced by [`crate::ChainStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying key-value failure.
    #[error(transparent)]
    KeyValue(#[from] KVStoreError),

    /// A stored record could not be encoded or decoded.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The head record does not hold a 32-byte hash.
    #[error("Corrupted head pointer: expected 32 bytes, found {len}")]
    CorruptedHead {
        /// Length of the stored value.
        len: usize,
    },
}
