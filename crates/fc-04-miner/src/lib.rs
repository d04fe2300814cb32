//! # Forge Chain - Miner (Subsystem 04)
//!
//! **Bounded Context:** Local block production
//!
//! A background worker that keeps extending the chain:
//!
//! 1. Drain `TransactionAccepted` events into a local queue
//! 2. Assemble a candidate: one coinbase paying the configured address plus up
//!    to `max_block_transactions - 1` queued transactions
//! 3. Mine it through `BlockChain::mine_block`, which publishes
//!    `NewLocalBlock` on success
//! 4. On failure, discard the candidate and retry without backoff
//!
//! ## State Machine
//!
//! ```text
//! Stopped ──start(payout)──▶ Running ──stop()──▶ Stopped
//! ```
//!
//! Starting while running and stopping while stopped are errors. Stopping
//! interrupts an in-flight proof-of-work search at its next poll.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ports;
pub mod service;

pub use config::MinerConfig;
pub use error::{MinerError, Result};
pub use ports::inbound::{MinerStatus, MiningService};
pub use service::Miner;
