//! # Forge Chain - Proof of Work (Subsystem 01)
//!
//! **Bounded Context:** Block hashing and difficulty
//!
//! ## Purpose
//!
//! - Convert 256-bit targets to and from the 32-bit compact form
//! - Search a nonce space for a block hash below the target
//! - Validate the nonce carried by a received block
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (Pure Logic)                                │
//! │  - compact: compact / expand / workload             │
//! │  - engine: ProofOfWork (prepare, search, validate)  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The difficulty is fixed for the lifetime of an engine. All operations are
//! total: a failed validation is reported as `false`, never as an error.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod domain;

pub use config::PowConfig;
pub use domain::compact::{compact, expand, workload};
pub use domain::engine::ProofOfWork;
