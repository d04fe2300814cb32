//! # Outbound Ports (Driven Ports)
//!
//! The transport the sync handler talks through. Framing and connection setup
//! live behind this trait.

use crate::domain::messages::Message;
use crate::error::TransportError;
use async_trait::async_trait;
use shared_types::PeerId;

/// One connection to a remote peer.
///
/// `recv` is called from a single task, the connection's dispatch loop.
/// `send` may be called concurrently.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Identity of the remote peer.
    fn peer_id(&self) -> PeerId;

    /// Send one message.
    async fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Wait for the next message.
    async fn recv(&self) -> Result<Message, TransportError>;

    /// Tear the connection down. Idempotent.
    fn close(&self);
}
