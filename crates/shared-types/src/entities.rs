//! # Core Domain Entities
//!
//! Defines the chain entities of the UTXO data model.
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `Transaction`, `TxInput`, `TxOutput`, `OutPoint`
//! - **Ledger**: `Utxo`, `KeyHash`
//! - **Networking**: `PeerId`

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// Hash of a recipient's public key. Outputs are locked to a key hash.
pub type KeyHash = Hash;

/// The all-zero digest. Parent of genesis and the txid of coinbase inputs.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Output index sentinel carried by the single input of a coinbase transaction.
pub const COINBASE_OUTPUT_INDEX: i64 = -1;

/// Unique identifier for a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct PeerId(pub [u8; 32]);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Reference to a specific output of an earlier transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Id of the transaction holding the output.
    pub txid: Hash,
    /// Position of the output, or [`COINBASE_OUTPUT_INDEX`] for coinbase inputs.
    pub index: i64,
}

impl OutPoint {
    /// Create an outpoint.
    pub fn new(txid: Hash, index: i64) -> Self {
        Self { txid, index }
    }

    /// The outpoint every coinbase input references.
    pub fn coinbase() -> Self {
        Self {
            txid: ZERO_HASH,
            index: COINBASE_OUTPUT_INDEX,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(&self.txid[..8]), self.index)
    }
}

/// Unlocking proof for an input.
///
/// The contents are opaque to the chain; the script verifier decides whether
/// they satisfy the referenced output's locking predicate. Coinbase inputs use
/// `signature` as free-form data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnlockProof {
    /// Signature over the transaction's sighash.
    pub signature: Vec<u8>,
    /// Public key of the spender.
    pub public_key: Vec<u8>,
}

/// A transaction input spending an earlier output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// The output being spent.
    pub prev_out: OutPoint,
    /// Proof that the spender may unlock `prev_out`.
    pub proof: UnlockProof,
}

impl TxInput {
    /// Create an input with an empty proof, to be signed later.
    pub fn unsigned(prev_out: OutPoint) -> Self {
        Self {
            prev_out,
            proof: UnlockProof::default(),
        }
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount carried by the output.
    pub value: u64,
    /// Locking predicate evaluated against the spending input's proof.
    pub lock: Vec<u8>,
    /// Recipient key hash, used for ledger queries.
    pub key_hash: KeyHash,
}

impl TxOutput {
    /// Pay-to-key-hash output: the lock is the recipient's key hash.
    pub fn to_key_hash(value: u64, key_hash: KeyHash) -> Self {
        Self {
            value,
            lock: key_hash.to_vec(),
            key_hash,
        }
    }

    /// Whether this output belongs to `key_hash`.
    pub fn is_locked_with(&self, key_hash: &KeyHash) -> bool {
        &self.key_hash == key_hash
    }
}

/// A UTXO transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Digest of the transaction content (see [`Transaction::compute_id`]).
    pub id: Hash,
    /// Inputs, in signing order.
    pub inputs: Vec<TxInput>,
    /// Outputs, addressed by position.
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Build a transaction and compute its id from its content.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: ZERO_HASH,
            inputs,
            outputs,
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Build the value-minting transaction of a block.
    ///
    /// The height is written into the coinbase data so that two coinbases
    /// paying the same address at different heights never share an id.
    pub fn coinbase(payout: KeyHash, reward: u64, height: u64) -> Self {
        let input = TxInput {
            prev_out: OutPoint::coinbase(),
            proof: UnlockProof {
                signature: Self::coinbase_data(height),
                public_key: Vec::new(),
            },
        };
        Self::new(vec![input], vec![TxOutput::to_key_hash(reward, payout)])
    }

    /// Data carried by the coinbase of the block at `height`.
    pub fn coinbase_data(height: u64) -> Vec<u8> {
        let mut data = b"coinbase:".to_vec();
        data.extend_from_slice(&height.to_be_bytes());
        data
    }

    /// A coinbase has exactly one input referencing the zero txid at index -1.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev_out == OutPoint::coinbase()
    }

    /// Digest of inputs (with proofs) and outputs.
    pub fn compute_id(&self) -> Hash {
        self.digest(true)
    }

    /// Message signed by every input: the content with all proofs cleared.
    pub fn sighash(&self) -> Hash {
        self.digest(false)
    }

    /// Sum of output values, `None` on overflow.
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Recompute and store the id, after the proofs were filled in.
    pub fn refresh_id(&mut self) {
        self.id = self.compute_id();
    }

    fn digest(&self, with_proofs: bool) -> Hash {
        let mut hasher = Sha256::new();

        hasher.update((self.inputs.len() as u64).to_be_bytes());
        for input in &self.inputs {
            hasher.update(input.prev_out.txid);
            hasher.update(input.prev_out.index.to_be_bytes());
            if with_proofs {
                hash_bytes(&mut hasher, &input.proof.signature);
                hash_bytes(&mut hasher, &input.proof.public_key);
            }
        }

        hasher.update((self.outputs.len() as u64).to_be_bytes());
        for output in &self.outputs {
            hasher.update(output.value.to_be_bytes());
            hash_bytes(&mut hasher, &output.lock);
            hasher.update(output.key_hash);
        }

        hasher.finalize().into()
    }
}

/// Length-prefixed write so adjacent variable fields cannot alias.
fn hash_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

// =============================================================================
// BLOCKS
// =============================================================================

/// A block of the chain.
///
/// Immutable once mined. The block hash is not stored: it is recomputed by the
/// proof-of-work engine from the other fields and the nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// 0 at genesis, parent height + 1 otherwise.
    pub height: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Parent block hash, all-zero only for genesis.
    pub prev_hash: Hash,
    /// Result of the proof-of-work search.
    pub nonce: U256,
    /// Ordered transactions; the first may be a coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Build an unmined block (nonce zero).
    pub fn new(height: u64, timestamp: u64, prev_hash: Hash, transactions: Vec<Transaction>) -> Self {
        Self {
            height,
            timestamp,
            prev_hash,
            nonce: U256::zero(),
            transactions,
        }
    }

    /// Whether this is a genesis block.
    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.prev_hash == ZERO_HASH
    }

    /// Transaction ids in block order.
    pub fn tx_ids(&self) -> impl Iterator<Item = &Hash> {
        self.transactions.iter().map(|tx| &tx.id)
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// An unspent output together with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Where the output lives.
    pub outpoint: OutPoint,
    /// The output itself.
    pub output: TxOutput,
}
