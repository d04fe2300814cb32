//! # Forge Chain - Chain Store (Subsystem 02)
//!
//! **Bounded Context:** Block persistence
//!
//! Append-only, hash-addressed block records plus one mutable head pointer.
//!
//! ## Persisted Layout
//!
//! | Key                  | Value                    |
//! |----------------------|--------------------------|
//! | `b` + 32-byte hash   | bincode-encoded `Block`  |
//! | `head`               | 32-byte head block hash  |
//!
//! Nothing else is persisted. Ledger and ancestor queries walk the blocks.
//!
//! ## Concurrency
//!
//! The store does no locking of its own beyond what the key-value engine
//! guarantees. All writers are serialized by the blockchain orchestrator.
//!
//! ## Module Structure
//!
//! - [`domain`]: error types
//! - [`ports`]: `KeyValueStore` and `BlockSerializer` driven ports
//! - [`adapters`]: in-memory key-value store, bincode serializer
//! - [`service`]: `ChainStore`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::memory::InMemoryKVStore;
pub use adapters::serializer::BincodeBlockSerializer;
pub use domain::errors::{KVStoreError, SerializationError, StoreError};
pub use ports::outbound::{BatchOperation, BlockSerializer, KeyValueStore};
pub use service::ChainStore;

/// Result type for chain store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
