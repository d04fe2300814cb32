//! Fixtures for chain tests.

use crate::config::{ChainConfig, GenesisConfig};
use crate::service::BlockChain;
use crate::EcdsaScriptVerifier;
use fc_01_proof_of_work::{PowConfig, ProofOfWork};
use fc_02_chain_store::{ChainStore, InMemoryKVStore};
use k256::ecdsa::SigningKey;
use shared_bus::InMemoryEventBus;
use shared_types::{Block, Hash, KeyHash, Transaction};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Difficulty used by fixtures: cheap to mine, still rejects most nonces.
pub const TEST_DIFFICULTY_BITS: u32 = 6;

/// Proof-of-work engine at [`TEST_DIFFICULTY_BITS`].
pub fn test_pow() -> ProofOfWork {
    ProofOfWork::new(&PowConfig {
        difficulty_bits: TEST_DIFFICULTY_BITS,
        interrupt_check_interval: 64,
    })
}

/// Deterministic signing key.
pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed.max(1); 32]).expect("seed is a valid scalar")
}

/// Key hash of [`signing_key`] for `seed`.
pub fn key_hash(seed: u8) -> KeyHash {
    crate::key_hash_of(signing_key(seed).verifying_key())
}

/// A bootstrapped in-memory chain and the bus it publishes to.
pub fn test_chain() -> (Arc<BlockChain>, Arc<InMemoryEventBus>) {
    test_chain_with(GenesisConfig::default())
}

/// Like [`test_chain`] with an explicit genesis.
pub fn test_chain_with(genesis: GenesisConfig) -> (Arc<BlockChain>, Arc<InMemoryEventBus>) {
    let bus = Arc::new(InMemoryEventBus::new());
    let chain = Arc::new(BlockChain::new(
        ChainStore::new(Arc::new(InMemoryKVStore::new())),
        test_pow(),
        Arc::new(EcdsaScriptVerifier::new()),
        bus.clone(),
        ChainConfig::default(),
    ));
    chain.bootstrap(&genesis).expect("bootstrap in-memory chain");
    (chain, bus)
}

/// Mine a child of `parent` without touching any chain.
pub fn mine_child(pow: &ProofOfWork, parent_hash: Hash, parent: &Block, txs: Vec<Transaction>) -> (Hash, Block) {
    let mut block = Block::new(parent.height + 1, parent.timestamp + 1, parent_hash, txs);
    let (nonce, hash) = pow
        .search(&block, &AtomicBool::new(false))
        .expect("search without interrupt");
    block.nonce = nonce;
    (hash, block)
}

/// Mine `count` coinbase-only blocks on top of `from`, paying `payout`.
///
/// The blocks are returned in ascending height order and not inserted.
pub fn build_branch(chain: &BlockChain, from: Hash, count: usize, payout: KeyHash) -> Vec<Block> {
    let pow = test_pow();
    let mut parent_hash = from;
    let mut parent = chain
        .block_by_hash(&from)
        .expect("store readable")
        .expect("branch base is stored");

    let mut blocks = Vec::with_capacity(count);
    for _ in 0..count {
        let coinbase = Transaction::coinbase(payout, 50, parent.height + 1);
        let (hash, block) = mine_child(&pow, parent_hash, &parent, vec![coinbase]);
        parent_hash = hash;
        parent = block.clone();
        blocks.push(block);
    }
    blocks
}
