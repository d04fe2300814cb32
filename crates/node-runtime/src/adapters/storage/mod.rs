//! # Storage Backends
//!
//! Opens the key-value engine selected by [`StorageConfig`].
//!
//! The in-memory engine is always available. The RocksDB engine needs the
//! `rocksdb` feature:
//!
//! ```toml
//! node-runtime = { path = "...", features = ["rocksdb"] }
//! ```

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

use crate::container::config::{StorageBackend, StorageConfig};
use fc_02_chain_store::{InMemoryKVStore, KVStoreError, KeyValueStore};
use std::sync::Arc;

/// Open the configured engine.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>, KVStoreError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryKVStore::new())),
        #[cfg(feature = "rocksdb")]
        StorageBackend::RocksDb => {
            let store = RocksDbStore::open(RocksDbConfig::in_dir(&config.data_dir))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::RocksDb => Err(KVStoreError::IOError {
            message: "built without the rocksdb feature".into(),
        }),
    }
}
