//! # Node Container
//!
//! Configuration for every subsystem the node wires together.

pub mod config;

pub use config::{ConfigError, MiningConfig, NodeConfig, StorageBackend, StorageConfig};
