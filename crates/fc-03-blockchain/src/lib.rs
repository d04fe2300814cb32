//! # Forge Chain - Blockchain (Subsystem 03)
//!
//! **Bounded Context:** Block acceptance and ledger
//!
//! ## Purpose
//!
//! - Bootstrap the genesis block
//! - Accept locally mined blocks and blocks received from peers through one
//!   validation routine
//! - Walk the chain from head to genesis
//! - Derive unspent outputs and balances on demand
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Service: BlockChain                                │
//! │  - bootstrap, add_block, insert_block, insert_batch │
//! │  - iter, block_by_height, hashes_in_range           │
//! │  - balance_of, spendable_outputs_for, new_transfer  │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports / Adapters                                   │
//! │  - ScriptVerifier  ← EcdsaScriptVerifier (k256)     │
//! │  - ChainStore (fc-02), ProofOfWork (fc-01)          │
//! │  - EventPublisher (shared-bus)                      │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (Pure Logic)                                │
//! │  - ledger: newest-first UTXO walks                  │
//! │  - validation: body structure and input checks      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Critical Invariants
//!
//! 1. Exactly one genesis block, first writer wins
//! 2. The head always names a stored block
//! 3. A block is stored only after its proof of work and every
//!    non-coinbase transaction were validated against its parent's branch
//! 4. Re-inserting a stored block is a no-op

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod iterator;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::ecdsa::{key_hash_of, sign_transaction, EcdsaScriptVerifier};
pub use config::{ChainConfig, GenesisConfig};
pub use error::{BatchInsertError, ChainError, Result};
pub use iterator::ChainIterator;
pub use ports::outbound::ScriptVerifier;
pub use service::{BlockChain, InsertOutcome};
