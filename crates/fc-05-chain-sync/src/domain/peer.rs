//! Connected peers and their reply queues.

use crate::domain::messages::{Message, MessageCode, Status};
use crate::error::{Result, SyncError};
use crate::ports::outbound::PeerTransport;
use parking_lot::RwLock;
use shared_types::{Block, Hash, PeerId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Replies buffered per peer before unsolicited ones are dropped.
const REPLY_QUEUE_DEPTH: usize = 4;

/// Head a peer announced, in the handshake or later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerHead {
    pub hash: Hash,
    pub height: u64,
}

/// A handshaken peer.
///
/// The dispatch loop pushes `Hashes` and `Blocks` replies into the peer's
/// queues; the sync pipeline pulls them with [`Peer::request_hashes`] and
/// [`Peer::request_blocks`].
pub struct Peer {
    id: PeerId,
    transport: Arc<dyn PeerTransport>,
    head: RwLock<PeerHead>,
    hashes_tx: mpsc::Sender<Vec<Hash>>,
    hashes_rx: Mutex<mpsc::Receiver<Vec<Hash>>>,
    blocks_tx: mpsc::Sender<Vec<Block>>,
    blocks_rx: Mutex<mpsc::Receiver<Vec<Block>>>,
}

impl Peer {
    /// Wrap a transport whose handshake produced `status`.
    pub fn new(transport: Arc<dyn PeerTransport>, status: &Status) -> Self {
        let (hashes_tx, hashes_rx) = mpsc::channel(REPLY_QUEUE_DEPTH);
        let (blocks_tx, blocks_rx) = mpsc::channel(REPLY_QUEUE_DEPTH);
        Self {
            id: transport.peer_id(),
            transport,
            head: RwLock::new(PeerHead {
                hash: status.head_hash,
                height: status.height,
            }),
            hashes_tx,
            hashes_rx: Mutex::new(hashes_rx),
            blocks_tx,
            blocks_rx: Mutex::new(blocks_rx),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn head(&self) -> PeerHead {
        *self.head.read()
    }

    /// Record an announced head if it is higher than the known one.
    pub fn observe_head(&self, hash: Hash, height: u64) {
        let mut head = self.head.write();
        if height > head.height {
            *head = PeerHead { hash, height };
        }
    }

    pub async fn send(&self, message: Message) -> Result<()> {
        Ok(self.transport.send(message).await?)
    }

    pub async fn recv(&self) -> Result<Message> {
        Ok(self.transport.recv().await?)
    }

    pub fn close(&self) {
        self.transport.close();
    }

    /// Hand a `Hashes` reply to the waiting request, if any.
    pub(crate) fn deliver_hashes(&self, hashes: Vec<Hash>) {
        if self.hashes_tx.try_send(hashes).is_err() {
            debug!(peer = %self.id, "[fc-05] Unsolicited hashes dropped");
        }
    }

    /// Hand a `Blocks` reply to the waiting request, if any.
    pub(crate) fn deliver_blocks(&self, blocks: Vec<Block>) {
        if self.blocks_tx.try_send(blocks).is_err() {
            debug!(peer = %self.id, "[fc-05] Unsolicited blocks dropped");
        }
    }

    /// Ask for hashes of heights `[from, from + count)` and wait for the reply.
    pub async fn request_hashes(&self, from: u64, count: u64, wait: Duration) -> Result<Vec<Hash>> {
        let mut replies = self.hashes_rx.lock().await;
        // Late replies to an earlier timed-out request
        while replies.try_recv().is_ok() {}

        self.send(Message::GetHashesFromHeight { from, count }).await?;
        self.await_reply(&mut replies, MessageCode::Hashes, wait).await
    }

    /// Ask for the blocks with `hashes` and wait for the reply.
    pub async fn request_blocks(&self, hashes: Vec<Hash>, wait: Duration) -> Result<Vec<Block>> {
        let mut replies = self.blocks_rx.lock().await;
        while replies.try_recv().is_ok() {}

        self.send(Message::GetBlocks(hashes)).await?;
        self.await_reply(&mut replies, MessageCode::Blocks, wait).await
    }

    async fn await_reply<T>(
        &self,
        replies: &mut mpsc::Receiver<T>,
        code: MessageCode,
        wait: Duration,
    ) -> Result<T> {
        match tokio::time::timeout(wait, replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            // Our own sender lives as long as the peer, so this is unreachable in practice
            Ok(None) => Err(SyncError::UnknownPeer(self.id)),
            Err(_) => Err(SyncError::ResponseTimeout { peer: self.id, code }),
        }
    }
}

/// Active peers keyed by identity.
#[derive(Default)]
pub struct PeerTable {
    peers: RwLock<HashMap<PeerId, Arc<Peer>>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer`. A second connection from the same identity is refused.
    pub fn insert(&self, peer: Arc<Peer>) -> Result<()> {
        let mut peers = self.peers.write();
        if peers.contains_key(&peer.id()) {
            return Err(SyncError::DuplicatePeer(peer.id()));
        }
        peers.insert(peer.id(), peer);
        Ok(())
    }

    pub fn remove(&self, id: &PeerId) -> Option<Arc<Peer>> {
        self.peers.write().remove(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<Arc<Peer>> {
        self.peers.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// The peer with the highest announced height. Ties go to the lowest id.
    pub fn best(&self) -> Option<Arc<Peer>> {
        self.peers
            .read()
            .values()
            .max_by(|a, b| {
                a.head()
                    .height
                    .cmp(&b.head().height)
                    .then_with(|| b.id().cmp(&a.id()))
            })
            .cloned()
    }

    /// Every peer except `except`.
    pub fn snapshot_except(&self, except: Option<PeerId>) -> Vec<Arc<Peer>> {
        self.peers
            .read()
            .values()
            .filter(|peer| Some(peer.id()) != except)
            .cloned()
            .collect()
    }
}
