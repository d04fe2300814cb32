//! # Forge Chain - Chain Sync (Subsystem 05)
//!
//! **Bounded Context:** Reconciling the local chain with peers
//!
//! ## Connection Lifecycle
//!
//! ```text
//! Handshake ──▶ Idle ──▶ Synchronizing ──▶ Idle ...
//!     │
//!     └── version / network / genesis mismatch, timeout ──▶ closed
//! ```
//!
//! Each connection runs its own dispatch loop ([`SyncHandler::handle`]).
//! Replies to our requests are routed to the waiting sync pipeline through
//! per-peer queues; requests from the peer are answered from the chain.
//!
//! ## Triggers
//!
//! A synchronization against the best peer runs on a fixed timer, when enough
//! peers are connected, or when a peer announces a block whose parent we lack.
//! Concurrent triggers coalesce.
//!
//! ## Relay
//!
//! `NewLocalBlock` events are announced to every peer. `TransactionAccepted`
//! events are relayed to every peer except the one the transaction came from.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::ChannelTransport;
pub use config::{SyncConfig, PROTOCOL_VERSION};
pub use domain::{Message, MessageCode, Peer, PeerHead, PeerTable, Status};
pub use error::{Result, SyncError, TransportError};
pub use ports::outbound::PeerTransport;
pub use service::SyncHandler;
