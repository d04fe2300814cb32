//! # Node Configuration
//!
//! Unified configuration for all subsystems and runtime parameters.
//!
//! Defaults come from each subsystem's config type; a handful of `FC_*`
//! environment variables override them:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `FC_DATA_DIR` | `storage.data_dir` |
//! | `FC_STORAGE` | `storage.backend` (`memory` or `rocksdb`) |
//! | `FC_DIFFICULTY_BITS` | `pow.difficulty_bits` |
//! | `FC_NETWORK_ID` | `sync.network_id` |
//! | `FC_PAYOUT_ADDRESS` | `mining.payout` (64 hex chars) |
//! | `FC_MINE` | `mining.enabled` |

use fc_01_proof_of_work::PowConfig;
use fc_03_blockchain::{ChainConfig, GenesisConfig};
use fc_05_chain_sync::SyncConfig;
use shared_types::{KeyHash, ZERO_HASH};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Proof-of-work configuration.
    pub pow: PowConfig,
    /// Consensus parameters.
    pub chain: ChainConfig,
    /// Genesis block parameters.
    pub genesis: GenesisConfig,
    /// Mining configuration.
    pub mining: MiningConfig,
    /// Peer synchronization configuration.
    pub sync: SyncConfig,
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment override could not be parsed.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    /// Mining is enabled without a payout address.
    #[error("Mining enabled but no payout address set (FC_PAYOUT_ADDRESS)")]
    MissingPayout,

    /// The storage backend was not compiled in.
    #[error("Storage backend {0} is not available in this build")]
    BackendUnavailable(StorageBackend),
}

impl NodeConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply `FC_*` overrides, reading each variable through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("FC_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("FC_STORAGE") {
            self.storage.backend = parse("FC_STORAGE", &backend)?;
        }
        if let Some(bits) = lookup("FC_DIFFICULTY_BITS") {
            self.pow.difficulty_bits = parse("FC_DIFFICULTY_BITS", &bits)?;
        }
        if let Some(id) = lookup("FC_NETWORK_ID") {
            self.sync.network_id = parse("FC_NETWORK_ID", &id)?;
        }
        if let Some(address) = lookup("FC_PAYOUT_ADDRESS") {
            self.mining.payout = Some(parse_key_hash(&address)?);
        }
        if let Some(mine) = lookup("FC_MINE") {
            self.mining.enabled = parse_flag("FC_MINE", &mine)?;
        }
        Ok(())
    }

    /// Check cross-field constraints before wiring the node.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mining.enabled && self.mining.payout.is_none() {
            return Err(ConfigError::MissingPayout);
        }
        if self.storage.backend == StorageBackend::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::BackendUnavailable(StorageBackend::RocksDb));
        }
        Ok(())
    }
}

/// Where blocks are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// Lost on exit. For tests and throwaway nodes.
    #[default]
    Memory,
    /// Persistent RocksDB under `data_dir`.
    RocksDb,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::RocksDb => write!(f, "rocksdb"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageBackend::Memory),
            "rocksdb" | "rocks" => Ok(StorageBackend::RocksDb),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Data directory for the RocksDB backend.
    pub data_dir: PathBuf,
    /// Selected backend.
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backend: StorageBackend::Memory,
        }
    }
}

/// Mining configuration.
#[derive(Debug, Clone, Default)]
pub struct MiningConfig {
    /// Start the miner with the node.
    pub enabled: bool,
    /// Key hash paid by mined coinbases.
    pub payout: Option<KeyHash>,
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        reason: e.to_string(),
    })
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            var,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_key_hash(value: &str) -> Result<KeyHash, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        var: "FC_PAYOUT_ADDRESS",
        reason,
    };
    let bytes = hex::decode(value.trim().trim_start_matches("0x")).map_err(|e| invalid(e.to_string()))?;
    let key_hash: KeyHash = bytes
        .as_slice()
        .try_into()
        .map_err(|_| invalid(format!("expected 32 bytes, got {}", bytes.len())))?;
    if key_hash == ZERO_HASH {
        return Err(invalid("the zero hash is not an address".into()));
    }
    Ok(key_hash)
}
