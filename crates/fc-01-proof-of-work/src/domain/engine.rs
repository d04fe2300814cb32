//! Fixed-target proof-of-work engine.

use crate::config::PowConfig;
use primitive_types::U256;
use sha2::{Digest, Sha256};
use shared_types::{sha256, Block, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Fixed-difficulty proof-of-work over SHA-256.
///
/// A block hash is valid iff, read as a big-endian integer, it is strictly
/// below `target = 1 << (256 - difficulty_bits)`.
#[derive(Clone, Debug)]
pub struct ProofOfWork {
    difficulty_bits: u32,
    target: U256,
    interrupt_check_interval: u64,
}

impl ProofOfWork {
    /// Build an engine from its configuration. Difficulty is capped at 255 bits.
    pub fn new(config: &PowConfig) -> Self {
        let difficulty_bits = config.difficulty_bits.min(255);
        let target = if difficulty_bits == 0 {
            U256::MAX
        } else {
            U256::one() << (256 - difficulty_bits as usize)
        };

        Self {
            difficulty_bits,
            target,
            interrupt_check_interval: config.interrupt_check_interval.max(1),
        }
    }

    /// Number of leading zero bits required.
    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    /// The 256-bit target hashes must fall below.
    pub fn target(&self) -> U256 {
        self.target
    }

    /// The exact preimage hashed for `block` with `nonce`.
    ///
    /// Layout: `prev_hash || sha256(tx ids) || timestamp || difficulty || nonce`,
    /// where timestamp and difficulty are decimal text and the nonce is 32
    /// big-endian bytes. Changing this layout changes every block hash.
    pub fn prepare(&self, block: &Block, nonce: U256) -> Vec<u8> {
        let mut data = self.prefix_bytes(block);
        data.extend_from_slice(&nonce_bytes(nonce));
        data
    }

    /// Hash of `block` with its own nonce.
    pub fn hash(&self, block: &Block) -> Hash {
        sha256(&self.prepare(block, block.nonce))
    }

    /// Whether `hash` satisfies the target.
    pub fn meets_target(&self, hash: &Hash) -> bool {
        U256::from_big_endian(hash) < self.target
    }

    /// Check the nonce carried by `block`.
    pub fn validate(&self, block: &Block) -> bool {
        self.meets_target(&self.hash(block))
    }

    /// Search nonces upward from zero for a hash below the target.
    ///
    /// `interrupt` is polled every `interrupt_check_interval` nonces; once set,
    /// the search gives up and returns `None`.
    pub fn search(&self, block: &Block, interrupt: &AtomicBool) -> Option<(U256, Hash)> {
        // Everything but the nonce is fixed for the search
        let mut prefix = Sha256::new();
        prefix.update(self.prefix_bytes(block));

        let mut nonce = U256::zero();
        let mut tried: u64 = 0;

        loop {
            if tried % self.interrupt_check_interval == 0 && interrupt.load(Ordering::Relaxed) {
                debug!(height = block.height, tried, "[fc-01] PoW search interrupted");
                return None;
            }

            let mut hasher = prefix.clone();
            hasher.update(nonce_bytes(nonce));
            let hash: Hash = hasher.finalize().into();

            if self.meets_target(&hash) {
                debug!(height = block.height, tried, "[fc-01] PoW solution found");
                return Some((nonce, hash));
            }

            nonce = nonce.overflowing_add(U256::one()).0;
            tried = tried.wrapping_add(1);
        }
    }

    fn prefix_bytes(&self, block: &Block) -> Vec<u8> {
        let mut tx_hasher = Sha256::new();
        for id in block.tx_ids() {
            tx_hasher.update(id);
        }
        let tx_digest: Hash = tx_hasher.finalize().into();

        let mut data = Vec::with_capacity(32 + 32 + 20 + 3 + 32);
        data.extend_from_slice(&block.prev_hash);
        data.extend_from_slice(&tx_digest);
        data.extend_from_slice(block.timestamp.to_string().as_bytes());
        data.extend_from_slice(self.difficulty_bits.to_string().as_bytes());
        data
    }
}

fn nonce_bytes(nonce: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    nonce.to_big_endian(&mut buf);
    buf
}
