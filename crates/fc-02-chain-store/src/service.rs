//! # Chain Store Service
//!
//! Block records keyed by hash plus the head pointer.

use crate::adapters::serializer::BincodeBlockSerializer;
use crate::domain::errors::StoreError;
use crate::ports::outbound::{BatchOperation, BlockSerializer, KeyValueStore};
use crate::Result;
use shared_types::{short_hex, Block, Hash, ZERO_HASH};
use std::sync::Arc;
use tracing::trace;

const BLOCK_PREFIX: u8 = b'b';
const HEAD_KEY: &[u8] = b"head";

/// Content-addressed block store with one mutable head pointer.
///
/// Callers are expected to serialize writers; see the crate docs.
#[derive(Clone)]
pub struct ChainStore {
    kv: Arc<dyn KeyValueStore>,
    serializer: Arc<dyn BlockSerializer>,
}

impl ChainStore {
    /// Build a store over `kv` with the bincode codec.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_serializer(kv, Arc::new(BincodeBlockSerializer))
    }

    /// Build a store with an explicit codec.
    pub fn with_serializer(kv: Arc<dyn KeyValueStore>, serializer: Arc<dyn BlockSerializer>) -> Self {
        Self { kv, serializer }
    }

    /// Write `block` under `hash` and move the head pointer to it, atomically.
    pub fn put_block(&self, hash: &Hash, block: &Block) -> Result<()> {
        let record = self.serializer.serialize(block)?;
        self.kv.atomic_batch_write(vec![
            BatchOperation::put(block_key(hash), record),
            BatchOperation::put(HEAD_KEY, hash.to_vec()),
        ])?;
        trace!(height = block.height, hash = %short_hex(hash), "[fc-02] block stored as head");
        Ok(())
    }

    /// Write `block` under `hash` without touching the head pointer.
    pub fn put_side_block(&self, hash: &Hash, block: &Block) -> Result<()> {
        let record = self.serializer.serialize(block)?;
        self.kv.put(&block_key(hash), &record)?;
        trace!(height = block.height, hash = %short_hex(hash), "[fc-02] side block stored");
        Ok(())
    }

    /// Fetch a block by hash.
    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
        match self.kv.get(&block_key(hash))? {
            Some(record) => Ok(Some(self.serializer.deserialize(&record)?)),
            None => Ok(None),
        }
    }

    /// Whether a block with `hash` is stored.
    pub fn has_block(&self, hash: &Hash) -> Result<bool> {
        Ok(self.kv.exists(&block_key(hash))?)
    }

    /// The head block hash, or [`ZERO_HASH`] for an uninitialized store.
    pub fn head_hash(&self) -> Result<Hash> {
        let Some(value) = self.kv.get(HEAD_KEY)? else {
            return Ok(ZERO_HASH);
        };
        value
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::CorruptedHead { len: value.len() })
    }
}

fn block_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + hash.len());
    key.push(BLOCK_PREFIX);
    key.extend_from_slice(hash);
    key
}
