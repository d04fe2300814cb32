//! In-memory transport over a pair of bounded tokio channels.

use crate::domain::messages::Message;
use crate::error::TransportError;
use crate::ports::outbound::PeerTransport;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::PeerId;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Notify};

/// Default per-direction buffer.
pub const DEFAULT_CHANNEL_DEPTH: usize = 256;

/// One end of an in-process connection.
pub struct ChannelTransport {
    remote: PeerId,
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl ChannelTransport {
    /// Connect `a` and `b`. The first end is held by `a` and talks to `b`.
    pub fn pair(a: PeerId, b: PeerId) -> (Self, Self) {
        Self::pair_with_depth(a, b, DEFAULT_CHANNEL_DEPTH)
    }

    /// Like [`ChannelTransport::pair`] with an explicit buffer depth.
    pub fn pair_with_depth(a: PeerId, b: PeerId, depth: usize) -> (Self, Self) {
        let (a_to_b, b_inbound) = mpsc::channel(depth.max(1));
        let (b_to_a, a_inbound) = mpsc::channel(depth.max(1));
        (Self::new(b, a_to_b, a_inbound), Self::new(a, b_to_a, b_inbound))
    }

    fn new(remote: PeerId, outbound: mpsc::Sender<Message>, inbound: mpsc::Receiver<Message>) -> Self {
        Self {
            remote,
            outbound: Mutex::new(Some(outbound)),
            inbound: tokio::sync::Mutex::new(inbound),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        }
    }
}

#[async_trait]
impl PeerTransport for ChannelTransport {
    fn peer_id(&self) -> PeerId {
        self.remote
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        let sender = self.outbound.lock().clone().ok_or(TransportError::Closed)?;
        sender
            .send(message)
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    async fn recv(&self) -> Result<Message, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            message = inbound.recv() => message.ok_or(TransportError::Disconnected),
            _ = self.close_signal.notified() => Err(TransportError::Closed),
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // Dropping our sender ends the remote's receive loop
            self.outbound.lock().take();
            self.close_signal.notify_one();
        }
    }
}
