//! # Domain Layer

pub mod messages;
pub mod peer;

pub use messages::{Message, MessageCode, Status};
pub use peer::{Peer, PeerHead, PeerTable};
