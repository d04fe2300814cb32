//! # Shared Bus - Event Feed Between Subsystems
//!
//! Blocks and transactions produced by one subsystem reach the others through
//! this bus instead of direct calls.
//!
//! ```text
//! ┌──────────────┐   NewLocalBlock    ┌──────────────┐
//! │  Blockchain  │ ─────────────────▶ │  Chain Sync  │  (broadcast to peers)
//! │   (fc-03)    │   NewHead          │   (fc-05)    │
//! └──────────────┘                    └──────────────┘
//!                                            │ TransactionAccepted
//!                                            ▼
//!                                     ┌──────────────┐
//!                                     │    Miner     │
//!                                     │   (fc-04)    │
//!                                     └──────────────┘
//! ```
//!
//! Events are a closed enum ([`ChainEvent`]) carrying an explicit
//! [`EventKind`] tag. The bus keeps one broadcast channel per kind, and a
//! subscription holds a receiver for each kind it asked for.
//!
//! Delivery is at-least-once to every subscriber alive at publish time. No
//! ordering is guaranteed across subscribers.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{ChainEvent, EventFilter, EventKind};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Subscription, SubscriptionError};

/// Events buffered per kind before the slowest subscriber of that kind lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
