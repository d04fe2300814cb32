//! # Shared Types Crate
//!
//! This crate contains the chain entities shared by every Forge-Chain subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: `Block`, `Transaction` and friends are defined
//!   here and nowhere else.
//! - **Recomputable Identity**: transaction ids and signing messages are always
//!   derived from content through [`Transaction::compute_id`] and
//!   [`Transaction::sighash`]; block hashes are derived by the proof-of-work
//!   engine and are never stored inside the block.

pub mod entities;
pub mod hashing;

pub use entities::*;
pub use hashing::{sha256, short_hex};
