//! # Node Runtime Library
//!
//! Wiring of the Forge-Chain subsystems into a running node. The binary in
//! `main.rs` is a thin shell over [`NodeRuntime`]; tests drive the same type.
//!
//! ```text
//!            ┌──────────── InMemoryEventBus ────────────┐
//!            │                                          │
//!   Miner (fc-04) ──▶ BlockChain (fc-03) ◀── SyncHandler (fc-05) ◀──▶ peers
//!                          │
//!                    ChainStore (fc-02) ──▶ KeyValueStore (memory | RocksDB)
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod container;
pub mod runtime;

pub use container::{ConfigError, NodeConfig};
pub use runtime::NodeRuntime;
