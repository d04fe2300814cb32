//! Head-to-genesis chain cursor.

use crate::error::{ChainError, Result};
use fc_02_chain_store::ChainStore;
use shared_types::{Block, Hash, ZERO_HASH};

/// Walks from a starting block to genesis, one parent hop at a time.
///
/// Yields `(hash, block)` pairs with strictly decreasing heights. A missing
/// block or a storage failure is yielded once as an error and ends the walk.
pub struct ChainIterator<'a> {
    store: &'a ChainStore,
    next: Hash,
}

impl<'a> ChainIterator<'a> {
    pub(crate) fn new(store: &'a ChainStore, start: Hash) -> Self {
        Self { store, next: start }
    }

    /// Drop the hashes and yield blocks only.
    pub fn blocks(self) -> impl Iterator<Item = Result<Block>> + 'a {
        self.map(|entry| entry.map(|(_, block)| block))
    }
}

impl Iterator for ChainIterator<'_> {
    type Item = Result<(Hash, Block)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == ZERO_HASH {
            return None;
        }
        let hash = self.next;

        match self.store.get_block(&hash) {
            Ok(Some(block)) => {
                self.next = block.prev_hash;
                Some(Ok((hash, block)))
            }
            Ok(None) => {
                self.next = ZERO_HASH;
                Some(Err(ChainError::MissingBlock { hash }))
            }
            Err(e) => {
                self.next = ZERO_HASH;
                Some(Err(e.into()))
            }
        }
    }
}
