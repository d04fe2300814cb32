//! # Blockchain Service
//!
//! The orchestrator that owns block acceptance.
//!
//! ## Write Path
//!
//! Every mutation of the chain store happens under `write_lock`:
//!
//! - `bootstrap`: mine and store genesis if the store is empty
//! - `mine_block` / `add_block`: local candidates, mined outside the lock and
//!   committed only if the head is still the block they were built on
//! - `insert_block` / `insert_batch`: blocks received from peers
//!
//! ## Fork Choice
//!
//! Every valid block whose parent is known is stored. The head pointer moves
//! only when the new block is higher than the current head, so the longest
//! known chain wins by height. Ties keep the current head.

use crate::config::{ChainConfig, GenesisConfig};
use crate::domain::{ledger, validation};
use crate::error::{BatchInsertError, ChainError, Result};
use crate::iterator::ChainIterator;
use crate::ports::outbound::ScriptVerifier;
use fc_01_proof_of_work::ProofOfWork;
use fc_02_chain_store::ChainStore;
use parking_lot::{Mutex, RwLock};
use shared_bus::{ChainEvent, EventPublisher};
use shared_types::{
    short_hex, Block, Hash, KeyHash, Transaction, TxInput, TxOutput, Utxo, ZERO_HASH,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Result of inserting a remote block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The block was already stored. Nothing changed.
    AlreadyKnown,
    /// The block became the new head.
    Extended,
    /// The block was stored on a branch that is not higher than the head.
    SideBranch,
}

#[derive(Clone)]
struct ChainHead {
    hash: Hash,
    block: Block,
}

/// Block acceptance, traversal and ledger queries over a [`ChainStore`].
pub struct BlockChain {
    store: ChainStore,
    pow: ProofOfWork,
    verifier: Arc<dyn ScriptVerifier>,
    events: Arc<dyn EventPublisher>,
    config: ChainConfig,

    /// Serializes every writer of `store`.
    write_lock: Mutex<()>,

    /// Mirror of the stored head, updated only after a successful write.
    head: RwLock<Option<ChainHead>>,

    genesis: RwLock<Hash>,
}

impl BlockChain {
    /// Create a blockchain over `store`. Call [`BlockChain::bootstrap`] before use.
    pub fn new(
        store: ChainStore,
        pow: ProofOfWork,
        verifier: Arc<dyn ScriptVerifier>,
        events: Arc<dyn EventPublisher>,
        config: ChainConfig,
    ) -> Self {
        Self {
            store,
            pow,
            verifier,
            events,
            config,
            write_lock: Mutex::new(()),
            head: RwLock::new(None),
            genesis: RwLock::new(ZERO_HASH),
        }
    }

    // =========================================================================
    // WRITE PATH
    // =========================================================================

    /// Create the genesis block if the store is empty, and load the head.
    ///
    /// Idempotent: on a non-empty store nothing is mined. Returns the genesis
    /// hash.
    pub fn bootstrap(&self, genesis: &GenesisConfig) -> Result<Hash> {
        let _guard = self.write_lock.lock();

        let head_hash = self.store.head_hash()?;
        if head_hash != ZERO_HASH {
            let head = self
                .store
                .get_block(&head_hash)?
                .ok_or(ChainError::MissingBlock { hash: head_hash })?;

            let genesis_hash = match ChainIterator::new(&self.store, head_hash).last() {
                Some(entry) => entry?.0,
                None => head_hash,
            };

            info!(
                height = head.height,
                head = %short_hex(&head_hash),
                genesis = %short_hex(&genesis_hash),
                "[fc-03] Existing chain loaded"
            );
            self.set_head(head_hash, head);
            *self.genesis.write() = genesis_hash;
            return Ok(genesis_hash);
        }

        let coinbase = Transaction::coinbase(genesis.payout, genesis.reward, 0);
        let mut block = Block::new(0, genesis.timestamp, ZERO_HASH, vec![coinbase]);
        let (nonce, hash) = self
            .pow
            .search(&block, &AtomicBool::new(false))
            .ok_or(ChainError::Interrupted)?;
        block.nonce = nonce;

        self.store.put_block(&hash, &block)?;

        let found = self.store.head_hash()?;
        if found != hash {
            return Err(ChainError::GenesisMismatch {
                expected: hash,
                found,
            });
        }

        info!(genesis = %short_hex(&hash), "[fc-03] Genesis block created");
        self.set_head(hash, block);
        *self.genesis.write() = hash;
        Ok(hash)
    }

    /// Mine `txs` on top of the head and append the result.
    ///
    /// Local mining path with a search that cannot be interrupted. See
    /// [`BlockChain::mine_block`].
    pub fn add_block(&self, txs: Vec<Transaction>) -> Result<(Hash, Block)> {
        self.mine_block(txs, &AtomicBool::new(false))
    }

    /// Mine `txs` on top of the head and append the result.
    ///
    /// The candidate is verified against the head under the lock. The nonce
    /// search runs without the lock so remote blocks keep flowing; if the head
    /// moved meanwhile the candidate is discarded with
    /// [`ChainError::StaleCandidate`]. A set `interrupt` ends the search with
    /// [`ChainError::Interrupted`].
    ///
    /// Any invalid transaction in `txs` yields [`ChainError::LocalInvariant`].
    pub fn mine_block(&self, txs: Vec<Transaction>, interrupt: &AtomicBool) -> Result<(Hash, Block)> {
        let parent = {
            let _guard = self.write_lock.lock();
            let parent = self.head_entry()?;
            self.validate_body(&txs, parent.block.height + 1, parent.hash).map_err(|e| match e {
                ChainError::Storage(_) | ChainError::MissingBlock { .. } => e,
                other => ChainError::LocalInvariant(other.to_string()),
            })?;
            parent
        };

        let timestamp = unix_now().max(parent.block.timestamp);
        let mut block = Block::new(parent.block.height + 1, timestamp, parent.hash, txs);
        let (nonce, hash) = self
            .pow
            .search(&block, interrupt)
            .ok_or(ChainError::Interrupted)?;
        block.nonce = nonce;

        let _guard = self.write_lock.lock();
        if self.head_hash() != parent.hash {
            debug!(
                height = block.height,
                parent = %short_hex(&parent.hash),
                "[fc-03] Head moved during mining, candidate is stale"
            );
            return Err(ChainError::StaleCandidate {
                parent: parent.hash,
            });
        }

        self.store.put_block(&hash, &block)?;
        self.set_head(hash, block.clone());

        info!(
            height = block.height,
            hash = %short_hex(&hash),
            txs = block.transactions.len(),
            "[fc-03] Mined block appended"
        );
        self.events.publish(ChainEvent::NewLocalBlock {
            hash,
            block: block.clone(),
        });

        Ok((hash, block))
    }

    /// Validate and store a block received from a peer.
    ///
    /// Re-inserting a stored block is a no-op that returns
    /// [`InsertOutcome::AlreadyKnown`]. On rejection the store is untouched.
    pub fn insert_block(&self, block: Block) -> Result<InsertOutcome> {
        let hash = self.pow.hash(&block);
        let _guard = self.write_lock.lock();

        if self.store.has_block(&hash)? {
            debug!(height = block.height, hash = %short_hex(&hash), "[fc-03] Block already known");
            return Ok(InsertOutcome::AlreadyKnown);
        }

        if let Err(e) = self.check_block(&hash, &block) {
            debug!(height = block.height, hash = %short_hex(&hash), error = %e, "[fc-03] Block rejected");
            return Err(e);
        }

        let head_height = self.head_entry()?.block.height;
        if block.height > head_height {
            self.store.put_block(&hash, &block)?;
            self.set_head(hash, block.clone());
            info!(height = block.height, hash = %short_hex(&hash), "[fc-03] Remote block is new head");
            self.events.publish(ChainEvent::NewHead { hash, block });
            Ok(InsertOutcome::Extended)
        } else {
            self.store.put_side_block(&hash, &block)?;
            info!(
                height = block.height,
                head_height,
                hash = %short_hex(&hash),
                "[fc-03] Remote block stored on side branch"
            );
            Ok(InsertOutcome::SideBranch)
        }
    }

    /// Insert blocks in order, stopping at the first failure.
    ///
    /// Blocks accepted before the failure stay committed. Returns how many
    /// blocks were newly stored.
    pub fn insert_batch(&self, blocks: Vec<Block>) -> std::result::Result<usize, BatchInsertError> {
        let total = blocks.len();
        let mut stored = 0;

        for (index, block) in blocks.into_iter().enumerate() {
            match self.insert_block(block) {
                Ok(InsertOutcome::AlreadyKnown) => {}
                Ok(_) => stored += 1,
                Err(source) => {
                    warn!(index, total, error = %source, "[fc-03] Batch insert stopped");
                    return Err(BatchInsertError { index, source });
                }
            }
        }

        Ok(stored)
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Verify a loose transaction against the current head.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<()> {
        if tx.is_coinbase() {
            return Err(ChainError::invalid_tx(tx.id, "coinbase outside a block"));
        }
        let head = self.head_entry()?;
        self.validate_body(std::slice::from_ref(tx), head.block.height + 1, head.hash)
    }

    fn check_block(&self, hash: &Hash, block: &Block) -> Result<()> {
        if !self.pow.meets_target(hash) {
            return Err(ChainError::InvalidProofOfWork { hash: *hash });
        }

        let parent = self
            .store
            .get_block(&block.prev_hash)?
            .ok_or(ChainError::UnknownParent {
                hash: *hash,
                parent: block.prev_hash,
            })?;

        if block.height != parent.height + 1 {
            return Err(ChainError::InvalidHeight {
                expected: parent.height + 1,
                found: block.height,
            });
        }

        self.validate_body(&block.transactions, block.height, block.prev_hash)
    }

    /// Body rules for a block at `height` whose parent is `parent`.
    fn validate_body(&self, txs: &[Transaction], height: u64, parent: Hash) -> Result<()> {
        validation::check_structure(
            txs,
            height,
            self.config.max_block_transactions,
            self.config.coinbase_reward,
        )?;

        let wanted = validation::spent_outpoints(txs);
        if wanted.is_empty() {
            return Ok(());
        }

        let resolved = ledger::resolve_outpoints(self.iter_from(parent).blocks(), &wanted)?;
        validation::check_inputs(txs, &resolved, self.verifier.as_ref())
    }

    // =========================================================================
    // TRAVERSAL
    // =========================================================================

    /// Cursor from the live stored head down to genesis.
    pub fn iter(&self) -> Result<ChainIterator<'_>> {
        Ok(ChainIterator::new(&self.store, self.store.head_hash()?))
    }

    /// Cursor from `hash` down to genesis.
    pub fn iter_from(&self, hash: Hash) -> ChainIterator<'_> {
        ChainIterator::new(&self.store, hash)
    }

    /// Hash of the head, or [`ZERO_HASH`] before bootstrap.
    pub fn head_hash(&self) -> Hash {
        self.head.read().as_ref().map_or(ZERO_HASH, |head| head.hash)
    }

    /// The head block, `None` before bootstrap.
    pub fn head_block(&self) -> Option<Block> {
        self.head.read().as_ref().map(|head| head.block.clone())
    }

    /// Height of the head, `None` before bootstrap.
    pub fn head_height(&self) -> Option<u64> {
        self.head.read().as_ref().map(|head| head.block.height)
    }

    /// Hash of the genesis block, [`ZERO_HASH`] before bootstrap.
    pub fn genesis_hash(&self) -> Hash {
        *self.genesis.read()
    }

    /// Fetch a stored block by hash.
    pub fn block_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
        Ok(self.store.get_block(hash)?)
    }

    /// Whether a block with `hash` is stored, on any branch.
    pub fn has_block(&self, hash: &Hash) -> Result<bool> {
        Ok(self.store.has_block(hash)?)
    }

    /// Hash a block the way the chain addresses it.
    pub fn block_hash(&self, block: &Block) -> Hash {
        self.pow.hash(block)
    }

    /// The block at height `n` on the head's branch.
    pub fn block_by_height(&self, n: u64) -> Result<Block> {
        Ok(self.entry_at_height(n)?.1)
    }

    /// Hashes of heights `[from, from + count)` on the head's branch, ascending.
    ///
    /// Stops early, without error, when the chain is shorter.
    pub fn hashes_in_range(&self, from: u64, count: u64) -> Result<Vec<Hash>> {
        let head = self.head_entry()?;
        let head_height = head.block.height;
        if count == 0 || from > head_height {
            return Ok(Vec::new());
        }
        let last = from.saturating_add(count - 1).min(head_height);

        let mut hashes = Vec::with_capacity((last - from + 1) as usize);
        for entry in self.iter_from(head.hash) {
            let (hash, block) = entry?;
            if block.height <= last {
                hashes.push(hash);
            }
            if block.height <= from {
                break;
            }
        }
        hashes.reverse();
        Ok(hashes)
    }

    fn entry_at_height(&self, n: u64) -> Result<(Hash, Block)> {
        let head = self.head_entry()?;
        if n == head.block.height {
            return Ok((head.hash, head.block));
        }
        if n > head.block.height {
            return Err(ChainError::HeightAboveHead {
                requested: n,
                head: head.block.height,
            });
        }

        for entry in self.iter_from(head.block.prev_hash) {
            let (hash, block) = entry?;
            if block.height == n {
                return Ok((hash, block));
            }
        }
        Err(ChainError::MissingBlock { hash: head.hash })
    }

    // =========================================================================
    // LEDGER
    // =========================================================================

    /// Every unspent output locked to `key` on the head's branch.
    pub fn find_unspent_outputs(&self, key: &KeyHash) -> Result<Vec<Utxo>> {
        Ok(ledger::collect_unspent(self.iter()?.blocks(), key, None)?.1)
    }

    /// Unspent outputs locked to `key`, collected until they cover `amount`.
    ///
    /// Returns the collected value, which is below `amount` when the key
    /// cannot afford it.
    pub fn spendable_outputs_for(&self, key: &KeyHash, amount: u64) -> Result<(u64, Vec<Utxo>)> {
        ledger::collect_unspent(self.iter()?.blocks(), key, Some(amount))
    }

    /// Total unspent value locked to `key`.
    pub fn balance_of(&self, key: &KeyHash) -> Result<u64> {
        Ok(ledger::collect_unspent(self.iter()?.blocks(), key, None)?.0)
    }

    /// Build an unsigned transfer of `amount` from `from` to `to`.
    ///
    /// Any excess over `amount` is returned to `from` as change.
    pub fn new_transfer(&self, from: &KeyHash, to: KeyHash, amount: u64) -> Result<Transaction> {
        if amount == 0 {
            return Err(ChainError::invalid_tx(ZERO_HASH, "transfer amount must be positive"));
        }

        let (available, utxos) = self.spendable_outputs_for(from, amount)?;
        if available < amount {
            return Err(ChainError::InsufficientFunds {
                needed: amount,
                available,
            });
        }

        let inputs = utxos
            .iter()
            .map(|utxo| TxInput::unsigned(utxo.outpoint))
            .collect();
        let mut outputs = vec![TxOutput::to_key_hash(amount, to)];
        if available > amount {
            outputs.push(TxOutput::to_key_hash(available - amount, *from));
        }

        Ok(Transaction::new(inputs, outputs))
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn head_entry(&self) -> Result<ChainHead> {
        self.head.read().clone().ok_or(ChainError::Uninitialized)
    }

    fn set_head(&self, hash: Hash, block: Block) {
        *self.head.write() = Some(ChainHead { hash, block });
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
