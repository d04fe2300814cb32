//! # Sync Handler Service
//!
//! One instance per node. [`SyncHandler::handle`] runs for the lifetime of a
//! connection; [`SyncHandler::start`] runs the sync trigger loop and the
//! broadcaster.
//!
//! ## Synchronization
//!
//! 1. Pick the best peer (highest announced height)
//! 2. [`SyncHandler::find_ancestor`]: highest height both chains share
//! 3. [`SyncHandler::fetch_hashes`]: walk the peer's hashes from the ancestor
//!    up, fetching and inserting the blocks we miss
//!
//! Only one synchronization runs at a time. A trigger that finds one in
//! flight is a no-op.

use crate::config::SyncConfig;
use crate::domain::messages::{Message, MessageCode, Status};
use crate::domain::peer::{Peer, PeerTable};
use crate::error::{Result, SyncError};
use crate::ports::outbound::PeerTransport;
use fc_03_blockchain::{BlockChain, ChainError, InsertOutcome};
use lru::LruCache;
use parking_lot::Mutex;
use shared_bus::{ChainEvent, EventFilter, EventKind, EventPublisher, InMemoryEventBus, Subscription};
use shared_types::{short_hex, Block, Hash, PeerId, Transaction};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Per-node synchronization and relay.
pub struct SyncHandler {
    chain: Arc<BlockChain>,
    event_bus: Arc<InMemoryEventBus>,
    config: SyncConfig,
    peers: PeerTable,

    /// Transaction ids already admitted or relayed
    known_txs: Mutex<LruCache<Hash, ()>>,

    /// Held for the duration of one synchronization
    sync_lock: tokio::sync::Mutex<()>,

    new_peer: Notify,
    sync_requests: mpsc::UnboundedSender<PeerId>,
    sync_requests_rx: Mutex<Option<mpsc::UnboundedReceiver<PeerId>>>,
}

impl SyncHandler {
    pub fn new(chain: Arc<BlockChain>, event_bus: Arc<InMemoryEventBus>, config: SyncConfig) -> Self {
        let capacity = NonZeroUsize::new(config.known_tx_cache).unwrap_or(NonZeroUsize::MIN);
        let (sync_requests, sync_requests_rx) = mpsc::unbounded_channel();
        Self {
            chain,
            event_bus,
            config,
            peers: PeerTable::new(),
            known_txs: Mutex::new(LruCache::new(capacity)),
            sync_lock: tokio::sync::Mutex::new(()),
            new_peer: Notify::new(),
            sync_requests,
            sync_requests_rx: Mutex::new(Some(sync_requests_rx)),
        }
    }

    /// The active peers.
    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    // =========================================================================
    // CONNECTION LIFECYCLE
    // =========================================================================

    /// Run one connection: handshake, then dispatch until the peer goes away.
    ///
    /// A clean disconnect returns `Ok`. Handshake failures and protocol
    /// violations return the error after closing the transport. Other peers
    /// and the chain are unaffected either way.
    pub async fn handle(&self, transport: Arc<dyn PeerTransport>) -> Result<()> {
        let peer_id = transport.peer_id();

        let status = match self.handshake(transport.as_ref()).await {
            Ok(status) => status,
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "[fc-05] Handshake rejected");
                transport.close();
                return Err(e);
            }
        };

        let peer = Arc::new(Peer::new(Arc::clone(&transport), &status));
        if let Err(e) = self.peers.insert(Arc::clone(&peer)) {
            warn!(peer = %peer_id, error = %e, "[fc-05] Handshake rejected");
            transport.close();
            return Err(e);
        }
        info!(
            peer = %peer_id,
            height = status.height,
            head = %short_hex(&status.head_hash),
            "[fc-05] Peer connected"
        );
        self.on_new_peer(peer_id);

        let result = self.dispatch_loop(&peer).await;
        self.peers.remove(&peer_id);
        peer.close();

        match result {
            Err(SyncError::Transport(_)) => {
                info!(peer = %peer_id, "[fc-05] Peer disconnected");
                Ok(())
            }
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "[fc-05] Peer dropped");
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Note a freshly registered peer for the sync loop.
    pub fn on_new_peer(&self, peer: PeerId) {
        debug!(%peer, peers = self.peers.len(), "[fc-05] New peer registered");
        self.new_peer.notify_one();
    }

    fn local_status(&self) -> Status {
        Status {
            protocol_version: self.config.protocol_version,
            network_id: self.config.network_id,
            genesis: self.chain.genesis_hash(),
            head_hash: self.chain.head_hash(),
            height: self.chain.head_height().unwrap_or(0),
        }
    }

    async fn handshake(&self, transport: &dyn PeerTransport) -> Result<Status> {
        let ours = self.local_status();
        transport.send(Message::Status(ours.clone())).await?;

        let reply = timeout(self.config.handshake_timeout, transport.recv())
            .await
            .map_err(|_| SyncError::HandshakeTimeout)??;
        let theirs = match reply {
            Message::Status(status) => status,
            other => return Err(SyncError::UnexpectedMessage { code: other.code() }),
        };

        if theirs.protocol_version != ours.protocol_version {
            return Err(SyncError::ProtocolMismatch {
                ours: ours.protocol_version,
                theirs: theirs.protocol_version,
            });
        }
        if theirs.network_id != ours.network_id {
            return Err(SyncError::NetworkMismatch {
                ours: ours.network_id,
                theirs: theirs.network_id,
            });
        }
        if theirs.genesis != ours.genesis {
            return Err(SyncError::GenesisMismatch {
                ours: ours.genesis,
                theirs: theirs.genesis,
            });
        }
        Ok(theirs)
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    async fn dispatch_loop(&self, peer: &Arc<Peer>) -> Result<()> {
        loop {
            let message = peer.recv().await?;
            self.dispatch(peer, message).await?;
        }
    }

    async fn dispatch(&self, peer: &Arc<Peer>, message: Message) -> Result<()> {
        match message {
            Message::Status(_) => Err(SyncError::UnexpectedMessage {
                code: MessageCode::Status,
            }),
            Message::GetHashesFromHeight { from, count } => {
                // One window plus its anchor, as sent by ancestor discovery
                let count = count.min(self.config.hash_window.saturating_add(1));
                let hashes = self.chain.hashes_in_range(from, count).unwrap_or_else(|e| {
                    warn!(peer = %peer.id(), error = %e, "[fc-05] Failed to read hashes");
                    Vec::new()
                });
                peer.send(Message::Hashes(hashes)).await
            }
            Message::Hashes(hashes) => {
                peer.deliver_hashes(hashes);
                Ok(())
            }
            Message::GetBlocks(hashes) => {
                if hashes.len() > self.config.max_blocks_per_request {
                    return Err(SyncError::Malformed {
                        peer: peer.id(),
                        reason: format!(
                            "requested {} blocks, limit is {}",
                            hashes.len(),
                            self.config.max_blocks_per_request
                        ),
                    });
                }
                let blocks = self.stored_blocks(peer.id(), &hashes);
                peer.send(Message::Blocks(blocks)).await
            }
            Message::Blocks(blocks) => {
                peer.deliver_blocks(blocks);
                Ok(())
            }
            Message::NewBlock(block) => self.on_new_block(peer, block).await,
            Message::Transactions(txs) => {
                self.on_transactions(peer.id(), txs);
                Ok(())
            }
        }
    }

    fn stored_blocks(&self, peer: PeerId, hashes: &[Hash]) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.chain.block_by_hash(hash) {
                Ok(Some(block)) => blocks.push(block),
                Ok(None) => {}
                Err(e) => {
                    warn!(%peer, error = %e, "[fc-05] Failed to read block");
                    break;
                }
            }
        }
        blocks
    }

    async fn on_new_block(&self, peer: &Arc<Peer>, block: Block) -> Result<()> {
        let hash = self.chain.block_hash(&block);
        let height = block.height;
        peer.observe_head(hash, height);

        let chain = Arc::clone(&self.chain);
        let outcome = tokio::task::spawn_blocking(move || chain.insert_block(block))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?;

        match outcome {
            Ok(InsertOutcome::AlreadyKnown) => {}
            Ok(outcome) => {
                debug!(peer = %peer.id(), height, hash = %short_hex(&hash), ?outcome, "[fc-05] Announced block accepted");
            }
            Err(ChainError::UnknownParent { .. }) => {
                debug!(peer = %peer.id(), height, "[fc-05] Announced block has unknown parent, requesting sync");
                self.request_sync(peer.id());
            }
            Err(e) if e.is_rejection() => {
                warn!(peer = %peer.id(), height, error = %e, "[fc-05] Announced block rejected");
            }
            Err(e) => {
                error!(peer = %peer.id(), height, error = %e, "[fc-05] Failed to store announced block");
            }
        }
        Ok(())
    }

    fn on_transactions(&self, peer: PeerId, txs: Vec<Transaction>) {
        for tx in txs {
            if self.known_txs.lock().put(tx.id, ()).is_some() {
                continue;
            }
            match self.chain.verify_transaction(&tx) {
                Ok(()) => {
                    debug!(%peer, tx = %short_hex(&tx.id), "[fc-05] Transaction accepted");
                    self.event_bus.publish(ChainEvent::TransactionAccepted {
                        tx,
                        origin: Some(peer),
                    });
                }
                Err(e) => {
                    debug!(%peer, tx = %short_hex(&tx.id), error = %e, "[fc-05] Transaction rejected");
                }
            }
        }
    }

    // =========================================================================
    // SYNCHRONIZATION
    // =========================================================================

    /// Synchronize with the best peer. Returns how many blocks were stored.
    pub async fn synchronise(&self) -> Result<usize> {
        match self.peers.best() {
            Some(peer) => self.synchronise_with(&peer).await,
            None => Ok(0),
        }
    }

    /// Synchronize with `peer` if it claims a higher chain.
    pub async fn synchronise_with(&self, peer: &Arc<Peer>) -> Result<usize> {
        let Ok(_guard) = self.sync_lock.try_lock() else {
            debug!(peer = %peer.id(), "[fc-05] Sync already running, trigger coalesced");
            return Ok(0);
        };

        let local_height = self.chain.head_height().ok_or(ChainError::Uninitialized)?;
        let remote = peer.head();
        if remote.height <= local_height {
            return Ok(0);
        }

        info!(
            peer = %peer.id(),
            local_height,
            remote_height = remote.height,
            "[fc-05] Sync started"
        );
        let ancestor = self.find_ancestor(peer).await?;
        let imported = self.fetch_hashes(peer, ancestor + 1).await?;
        info!(
            peer = %peer.id(),
            ancestor,
            imported,
            height = self.chain.head_height().unwrap_or(0),
            "[fc-05] Sync finished"
        );
        Ok(imported)
    }

    /// Highest height at which the local chain and `peer` agree.
    ///
    /// First asks for the hashes at heights `[local - window, local]`. If the
    /// window starts with a block we know, the ancestor is the last known one
    /// before the first unknown. Otherwise the divergence lies below the
    /// window and a binary search over single hashes finds it.
    pub async fn find_ancestor(&self, peer: &Peer) -> Result<u64> {
        let window = self.config.hash_window.max(1);
        let local_height = self.chain.head_height().ok_or(ChainError::Uninitialized)?;
        let from = local_height.saturating_sub(window);

        let hashes = peer
            .request_hashes(from, local_height - from + 1, self.config.response_timeout)
            .await?;

        let mut known: u64 = 0;
        for hash in &hashes {
            if !self.chain.has_block(hash)? {
                break;
            }
            known += 1;
        }

        if known > 0 {
            let ancestor = from + known - 1;
            debug!(peer = %peer.id(), ancestor, "[fc-05] Ancestor found in window");
            return Ok(ancestor);
        }

        let ancestor = self
            .binary_search_ancestor(peer, from.saturating_sub(1))
            .await?;
        debug!(peer = %peer.id(), ancestor, "[fc-05] Ancestor found by binary search");
        Ok(ancestor)
    }

    async fn binary_search_ancestor(&self, peer: &Peer, upper: u64) -> Result<u64> {
        // Height 0 is common: the handshake checked genesis
        let (mut lo, mut hi) = (0u64, upper);
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            let reply = peer
                .request_hashes(mid, 1, self.config.response_timeout)
                .await?;
            let common = match reply.first() {
                Some(hash) => self.chain.has_block(hash)?,
                None => false,
            };
            if common {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Ok(lo)
    }

    /// Pull hashes from height `from` upward and fetch the missing blocks.
    ///
    /// Ends when the peer answers with an empty hash list or an empty block
    /// batch. Returns how many blocks were stored.
    pub async fn fetch_hashes(&self, peer: &Peer, from: u64) -> Result<usize> {
        let window = self.config.hash_window.max(1);
        let chunk_size = self.config.max_blocks_per_request.max(1);
        let mut next = from;
        let mut imported = 0;

        loop {
            let hashes = peer
                .request_hashes(next, window, self.config.response_timeout)
                .await?;
            if hashes.is_empty() {
                debug!(peer = %peer.id(), next, "[fc-05] No more hashes");
                return Ok(imported);
            }
            next += hashes.len() as u64;

            let missing = self.missing_locally(&hashes)?;
            for chunk in missing.chunks(chunk_size) {
                match self.fetch_chunk(peer, chunk).await? {
                    Some(stored) => imported += stored,
                    None => return Ok(imported),
                }
            }
        }
    }

    /// Fetch one chunk of missing blocks.
    ///
    /// When the batch fails part way, the blocks still missing are requested
    /// once more; a second failure ends the synchronization.
    async fn fetch_chunk(&self, peer: &Peer, chunk: &[Hash]) -> Result<Option<usize>> {
        let failure = match self.fetch_blocks(peer, chunk.to_vec()).await {
            Err(SyncError::Batch(e)) => e,
            other => return other,
        };

        let remaining = self.missing_locally(chunk)?;
        let stored = chunk.len() - remaining.len();
        if remaining.is_empty() {
            return Ok(Some(stored));
        }
        info!(
            peer = %peer.id(),
            index = failure.index,
            remaining = remaining.len(),
            "[fc-05] Re-requesting blocks after batch failure"
        );
        Ok(self
            .fetch_blocks(peer, remaining)
            .await?
            .map(|retried| stored + retried))
    }

    fn missing_locally(&self, hashes: &[Hash]) -> Result<Vec<Hash>> {
        let mut missing = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if !self.chain.has_block(hash)? {
                missing.push(*hash);
            }
        }
        Ok(missing)
    }

    /// Request `hashes` from `peer` and insert the reply as one batch.
    ///
    /// Returns `None` when the peer sent an empty batch.
    pub async fn fetch_blocks(&self, peer: &Peer, hashes: Vec<Hash>) -> Result<Option<usize>> {
        let blocks = peer
            .request_blocks(hashes, self.config.response_timeout)
            .await?;
        if blocks.is_empty() {
            debug!(peer = %peer.id(), "[fc-05] Peer sent no blocks");
            return Ok(None);
        }

        let received = blocks.len();
        let chain = Arc::clone(&self.chain);
        let stored = tokio::task::spawn_blocking(move || chain.insert_batch(blocks))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?;

        match stored {
            Ok(stored) => {
                debug!(peer = %peer.id(), received, stored, "[fc-05] Block batch inserted");
                Ok(Some(stored))
            }
            Err(e) => {
                warn!(peer = %peer.id(), index = e.index, received, error = %e.source, "[fc-05] Block batch failed");
                Err(e.into())
            }
        }
    }

    fn request_sync(&self, peer: PeerId) {
        if self.sync_requests.send(peer).is_err() {
            debug!(%peer, "[fc-05] Sync loop gone, request dropped");
        }
    }

    // =========================================================================
    // BROADCAST
    // =========================================================================

    /// Announce `block` to every active peer. Returns how many sends succeeded.
    pub async fn broadcast_block(&self, block: &Block) -> usize {
        self.fan_out(Message::NewBlock(block.clone()), None).await
    }

    /// Relay `txs` to every active peer except `origin`.
    pub async fn broadcast_transactions(&self, txs: Vec<Transaction>, origin: Option<PeerId>) -> usize {
        {
            let mut known = self.known_txs.lock();
            for tx in &txs {
                known.put(tx.id, ());
            }
        }
        self.fan_out(Message::Transactions(txs), origin).await
    }

    async fn fan_out(&self, message: Message, except: Option<PeerId>) -> usize {
        let code = message.code();
        let mut delivered = 0;
        for peer in self.peers.snapshot_except(except) {
            match peer.send(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(peer = %peer.id(), %code, error = %e, "[fc-05] Broadcast send failed"),
            }
        }
        delivered
    }

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================

    /// Spawn the sync trigger loop and the broadcaster. Both stop when
    /// `shutdown` flips to `true`.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        let requests = self
            .sync_requests_rx
            .lock()
            .take()
            .ok_or(SyncError::AlreadyStarted)?;
        let subscription = self.event_bus.subscribe(EventFilter::kinds(vec![
            EventKind::NewLocalBlock,
            EventKind::TransactionAccepted,
        ]));

        info!("[fc-05] Sync handler started");
        Ok(tokio::spawn(async move {
            tokio::join!(
                self.sync_loop(requests, shutdown.clone()),
                self.broadcast_loop(subscription, shutdown),
            );
            info!("[fc-05] Sync handler stopped");
        }))
    }

    async fn sync_loop(
        &self,
        mut requests: mpsc::UnboundedReceiver<PeerId>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.config.force_sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => self.run_sync(None).await,
                _ = self.new_peer.notified() => {
                    if self.peers.len() >= self.config.min_desired_peers {
                        self.run_sync(None).await;
                    }
                }
                Some(peer) = requests.recv() => self.run_sync(Some(peer)).await,
            }
        }
    }

    async fn run_sync(&self, target: Option<PeerId>) {
        let peer = match target {
            Some(id) => self.peers.get(&id),
            None => self.peers.best(),
        };
        let Some(peer) = peer else {
            return;
        };
        if let Err(e) = self.synchronise_with(&peer).await {
            warn!(peer = %peer.id(), error = %e, "[fc-05] Sync aborted");
        }
    }

    async fn broadcast_loop(&self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = subscription.recv() => match event {
                    Some(ChainEvent::NewLocalBlock { block, .. }) => {
                        self.broadcast_block(&block).await;
                    }
                    Some(ChainEvent::TransactionAccepted { tx, origin }) => {
                        self.broadcast_transactions(vec![tx], origin).await;
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ChannelTransport;
    use fc_03_blockchain::sign_transaction;
    use fc_03_blockchain::test_utils::{
        build_branch, key_hash, signing_key, test_chain, test_chain_with, test_pow,
    };
    use fc_03_blockchain::GenesisConfig;
    use shared_types::U256;
    use std::time::Duration;

    const LOCAL: PeerId = PeerId([1; 32]);
    const REMOTE: PeerId = PeerId([2; 32]);

    fn handler(chain: Arc<BlockChain>, bus: Arc<InMemoryEventBus>, config: SyncConfig) -> Arc<SyncHandler> {
        Arc::new(SyncHandler::new(chain, bus, config))
    }

    fn serve(handler: &Arc<SyncHandler>, transport: ChannelTransport) -> JoinHandle<Result<()>> {
        let handler = Arc::clone(handler);
        tokio::spawn(async move { handler.handle(Arc::new(transport)).await })
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(10), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Connect two handlers; `local` sees the other as `REMOTE`.
    async fn connect(local: &Arc<SyncHandler>, remote: &Arc<SyncHandler>) -> Arc<Peer> {
        let (at_local, at_remote) = ChannelTransport::pair(LOCAL, REMOTE);
        serve(local, at_local);
        serve(remote, at_remote);
        wait_for(|| local.peers().get(&REMOTE).is_some() && remote.peers().get(&LOCAL).is_some()).await;
        local.peers().get(&REMOTE).expect("registered")
    }

    /// Drive the remote end by hand: answer the handshake with `status`.
    async fn scripted_peer(local: &Arc<SyncHandler>, status: Status) -> ChannelTransport {
        let (at_local, at_remote) = ChannelTransport::pair(LOCAL, REMOTE);
        serve(local, at_local);
        assert!(matches!(at_remote.recv().await, Ok(Message::Status(_))));
        at_remote.send(Message::Status(status)).await.unwrap();
        wait_for(|| local.peers().get(&REMOTE).is_some()).await;
        at_remote
    }

    /// Two chains sharing heights 0..=60; local ends at 100, remote at 105.
    fn diverged_chains() -> (Arc<BlockChain>, Arc<InMemoryEventBus>, Arc<BlockChain>, Arc<InMemoryEventBus>) {
        let (local, local_bus) = test_chain();
        let (remote, remote_bus) = test_chain();

        let shared = build_branch(&local, local.genesis_hash(), 60, key_hash(1));
        local.insert_batch(shared.clone()).unwrap();
        remote.insert_batch(shared).unwrap();

        let ours = build_branch(&local, local.head_hash(), 40, key_hash(2));
        local.insert_batch(ours).unwrap();
        let theirs = build_branch(&remote, remote.head_hash(), 45, key_hash(3));
        remote.insert_batch(theirs).unwrap();

        (local, local_bus, remote, remote_bus)
    }

    // =========================================================================
    // HANDSHAKE
    // =========================================================================

    #[tokio::test]
    async fn test_handshake_rejects_network_mismatch() {
        let (a_chain, a_bus) = test_chain();
        let (b_chain, b_bus) = test_chain();
        let a = handler(a_chain, a_bus, SyncConfig::for_testing());
        let b = handler(
            b_chain,
            b_bus,
            SyncConfig {
                network_id: 7,
                ..SyncConfig::for_testing()
            },
        );

        let (at_a, at_b) = ChannelTransport::pair(LOCAL, REMOTE);
        let (ra, rb) = tokio::join!(a.handle(Arc::new(at_a)), b.handle(Arc::new(at_b)));

        assert!(matches!(ra, Err(SyncError::NetworkMismatch { ours: 1, theirs: 7 })));
        assert!(matches!(rb, Err(SyncError::NetworkMismatch { ours: 7, theirs: 1 })));
        assert!(a.peers().is_empty());
    }

    #[tokio::test]
    async fn test_handshake_rejects_foreign_genesis() {
        let (a_chain, a_bus) = test_chain();
        let (b_chain, b_bus) = test_chain_with(GenesisConfig {
            payout: key_hash(9),
            ..GenesisConfig::default()
        });
        let a = handler(a_chain, a_bus, SyncConfig::for_testing());
        let b = handler(b_chain, b_bus, SyncConfig::for_testing());

        let (at_a, at_b) = ChannelTransport::pair(LOCAL, REMOTE);
        let (ra, _) = tokio::join!(a.handle(Arc::new(at_a)), b.handle(Arc::new(at_b)));
        assert!(matches!(ra, Err(SyncError::GenesisMismatch { .. })));
    }

    #[tokio::test]
    async fn test_handshake_times_out() {
        let (chain, bus) = test_chain();
        let local = handler(chain, bus, SyncConfig::for_testing());

        // The remote end stays silent
        let (at_local, _at_remote) = ChannelTransport::pair(LOCAL, REMOTE);
        let result = local.handle(Arc::new(at_local)).await;

        assert!(matches!(result, Err(SyncError::HandshakeTimeout)));
        assert!(local.peers().is_empty());
    }

    #[tokio::test]
    async fn test_status_after_handshake_drops_peer() {
        let (chain, bus) = test_chain();
        let local = handler(Arc::clone(&chain), bus, SyncConfig::for_testing());
        let status = local.local_status();

        let (at_local, at_remote) = ChannelTransport::pair(LOCAL, REMOTE);
        let handle = serve(&local, at_local);
        at_remote.recv().await.unwrap();
        at_remote.send(Message::Status(status.clone())).await.unwrap();
        at_remote.send(Message::Status(status)).await.unwrap();

        let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(SyncError::UnexpectedMessage { .. })));
        assert!(local.peers().is_empty());
        assert_eq!(at_remote.recv().await, Err(crate::error::TransportError::Disconnected));
    }

    // =========================================================================
    // ANCESTOR DISCOVERY
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_find_ancestor_within_window() {
        let (local_chain, local_bus, remote_chain, remote_bus) = diverged_chains();
        let local = handler(local_chain, local_bus, SyncConfig::for_testing());
        let remote = handler(remote_chain, remote_bus, SyncConfig::for_testing());

        let peer = connect(&local, &remote).await;
        assert_eq!(local.find_ancestor(&peer).await.unwrap(), 60);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_find_ancestor_by_binary_search() {
        let (local_chain, local_bus, remote_chain, remote_bus) = diverged_chains();
        let narrow = SyncConfig {
            hash_window: 8,
            ..SyncConfig::for_testing()
        };
        let local = handler(local_chain, local_bus, narrow.clone());
        let remote = handler(remote_chain, remote_bus, narrow);

        let peer = connect(&local, &remote).await;
        assert_eq!(local.find_ancestor(&peer).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_ancestor_window_ends_at_local_head() {
        let (chain, bus) = test_chain();
        chain.insert_batch(build_branch(&chain, chain.genesis_hash(), 10, key_hash(4))).unwrap();
        let config = SyncConfig {
            hash_window: 4,
            ..SyncConfig::for_testing()
        };
        let local = handler(Arc::clone(&chain), bus, config);
        let remote = scripted_peer(&local, local.local_status()).await;
        let peer = local.peers().get(&REMOTE).unwrap();

        let search = {
            let local = Arc::clone(&local);
            tokio::spawn(async move { local.find_ancestor(&peer).await })
        };
        assert_eq!(
            remote.recv().await,
            Ok(Message::GetHashesFromHeight { from: 6, count: 5 })
        );
        remote
            .send(Message::Hashes(chain.hashes_in_range(6, 5).unwrap()))
            .await
            .unwrap();

        // The whole window is common, so the ancestor is the local head
        assert_eq!(search.await.unwrap().unwrap(), 10);
    }

    #[tokio::test]
    async fn test_serves_window_plus_anchor() {
        let (chain, bus) = test_chain();
        chain.insert_batch(build_branch(&chain, chain.genesis_hash(), 10, key_hash(4))).unwrap();
        let config = SyncConfig {
            hash_window: 4,
            ..SyncConfig::for_testing()
        };
        let local = handler(Arc::clone(&chain), bus, config);
        let remote = scripted_peer(&local, local.local_status()).await;

        remote.send(Message::GetHashesFromHeight { from: 0, count: 100 }).await.unwrap();
        assert_eq!(
            remote.recv().await,
            Ok(Message::Hashes(chain.hashes_in_range(0, 5).unwrap()))
        );
    }

    // =========================================================================
    // FETCH PIPELINE
    // =========================================================================

    #[tokio::test]
    async fn test_empty_hashes_end_fetch_without_block_request() {
        let (chain, bus) = test_chain();
        let local = handler(Arc::clone(&chain), bus, SyncConfig::for_testing());
        let mut status = local.local_status();
        status.height = 10;

        let remote = scripted_peer(&local, status).await;
        let peer = local.peers().get(&REMOTE).unwrap();

        let fetch = {
            let local = Arc::clone(&local);
            tokio::spawn(async move { local.fetch_hashes(&peer, 1).await })
        };

        assert_eq!(
            remote.recv().await,
            Ok(Message::GetHashesFromHeight { from: 1, count: 512 })
        );
        remote.send(Message::Hashes(vec![])).await.unwrap();

        assert_eq!(fetch.await.unwrap().unwrap(), 0);
        // Nothing else was requested
        assert!(timeout(Duration::from_millis(100), remote.recv()).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_synchronise_adopts_longer_chain() {
        let (local_chain, local_bus, remote_chain, remote_bus) = diverged_chains();
        let local = handler(Arc::clone(&local_chain), local_bus, SyncConfig::for_testing());
        let remote = handler(Arc::clone(&remote_chain), remote_bus, SyncConfig::for_testing());

        connect(&local, &remote).await;
        assert_eq!(local.synchronise().await.unwrap(), 45);

        assert_eq!(local_chain.head_hash(), remote_chain.head_hash());
        assert_eq!(local_chain.head_height(), Some(105));
        // Our old branch is still stored
        assert_eq!(local_chain.iter().unwrap().count(), 106);

        // A second round has nothing left to do
        assert_eq!(local.synchronise().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fetch_stops_when_retry_is_rejected() {
        let (chain, bus) = test_chain();
        let local = handler(Arc::clone(&chain), bus, SyncConfig::for_testing());
        let mut status = local.local_status();
        status.height = 3;
        let remote = scripted_peer(&local, status).await;
        let peer = local.peers().get(&REMOTE).unwrap();

        let mut blocks = build_branch(&chain, chain.genesis_hash(), 3, key_hash(4));
        let hashes: Vec<Hash> = blocks.iter().map(|b| chain.block_hash(b)).collect();
        let pow = test_pow();
        while pow.validate(&blocks[1]) {
            blocks[1].nonce += U256::one();
        }

        let fetch = {
            let local = Arc::clone(&local);
            tokio::spawn(async move { local.fetch_hashes(&peer, 1).await })
        };
        assert!(matches!(remote.recv().await, Ok(Message::GetHashesFromHeight { .. })));
        remote.send(Message::Hashes(hashes.clone())).await.unwrap();
        assert_eq!(remote.recv().await, Ok(Message::GetBlocks(hashes.clone())));
        remote.send(Message::Blocks(blocks.clone())).await.unwrap();

        // The blocks after the committed prefix are asked for again
        assert_eq!(remote.recv().await, Ok(Message::GetBlocks(hashes[1..].to_vec())));
        remote.send(Message::Blocks(blocks[1..].to_vec())).await.unwrap();

        let err = fetch.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::Batch(ref e) if e.index == 0));
        assert!(!err.is_connection_fatal());
        assert!(chain.has_block(&hashes[0]).unwrap());
        assert_eq!(chain.head_height(), Some(1));
        assert!(local.peers().get(&REMOTE).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fetch_continues_after_failed_batch() {
        let (source, _) = test_chain();
        let blocks = build_branch(&source, source.genesis_hash(), 4, key_hash(4));
        let hashes: Vec<Hash> = blocks.iter().map(|b| source.block_hash(b)).collect();

        let (chain, bus) = test_chain();
        let local = handler(Arc::clone(&chain), bus, SyncConfig::for_testing());
        let mut status = local.local_status();
        status.height = 4;
        let remote = scripted_peer(&local, status).await;
        let peer = local.peers().get(&REMOTE).unwrap();

        let fetch = {
            let local = Arc::clone(&local);
            tokio::spawn(async move { local.fetch_hashes(&peer, 1).await })
        };
        assert!(matches!(remote.recv().await, Ok(Message::GetHashesFromHeight { from: 1, .. })));
        remote.send(Message::Hashes(hashes.clone())).await.unwrap();
        assert_eq!(remote.recv().await, Ok(Message::GetBlocks(hashes.clone())));

        // Height 3 is missing from the reply, so height 4 has no parent yet
        let partial = vec![blocks[0].clone(), blocks[1].clone(), blocks[3].clone()];
        remote.send(Message::Blocks(partial)).await.unwrap();

        assert_eq!(remote.recv().await, Ok(Message::GetBlocks(hashes[2..].to_vec())));
        remote.send(Message::Blocks(blocks[2..].to_vec())).await.unwrap();

        assert!(matches!(remote.recv().await, Ok(Message::GetHashesFromHeight { from: 5, .. })));
        remote.send(Message::Hashes(vec![])).await.unwrap();

        assert_eq!(fetch.await.unwrap().unwrap(), 4);
        assert_eq!(chain.head_hash(), hashes[3]);
    }

    #[tokio::test]
    async fn test_oversized_block_request_is_malformed() {
        let (chain, bus) = test_chain();
        let config = SyncConfig {
            max_blocks_per_request: 2,
            ..SyncConfig::for_testing()
        };
        let local = handler(chain, bus, config);
        let (at_local, at_remote) = ChannelTransport::pair(LOCAL, REMOTE);
        let handle = serve(&local, at_local);

        at_remote.recv().await.unwrap();
        at_remote.send(Message::Status(local.local_status())).await.unwrap();
        at_remote.send(Message::GetBlocks(vec![[0; 32]; 3])).await.unwrap();

        let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(SyncError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_serves_hashes_and_blocks() {
        let (chain, bus) = test_chain();
        chain.insert_batch(build_branch(&chain, chain.genesis_hash(), 3, key_hash(4))).unwrap();
        let local = handler(Arc::clone(&chain), bus, SyncConfig::for_testing());
        let remote = scripted_peer(&local, local.local_status()).await;

        remote.send(Message::GetHashesFromHeight { from: 2, count: 10 }).await.unwrap();
        let expected = chain.hashes_in_range(2, 10).unwrap();
        assert_eq!(expected.len(), 2);
        assert_eq!(remote.recv().await, Ok(Message::Hashes(expected.clone())));

        remote
            .send(Message::GetBlocks(vec![expected[1], [0xee; 32]]))
            .await
            .unwrap();
        assert_eq!(
            remote.recv().await,
            Ok(Message::Blocks(vec![chain.block_by_height(3).unwrap()]))
        );
    }

    // =========================================================================
    // ANNOUNCEMENTS AND RELAY
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_announced_block_extends_chain() {
        let (chain, bus) = test_chain();
        let local = handler(Arc::clone(&chain), bus, SyncConfig::for_testing());
        let remote = scripted_peer(&local, local.local_status()).await;

        let block = build_branch(&chain, chain.genesis_hash(), 1, key_hash(4)).remove(0);
        let hash = chain.block_hash(&block);
        remote.send(Message::NewBlock(block)).await.unwrap();

        wait_for(|| chain.head_hash() == hash).await;
        assert_eq!(local.peers().get(&REMOTE).unwrap().head().height, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_announced_orphan_triggers_sync() {
        let (source, _) = test_chain();
        let blocks = build_branch(&source, source.genesis_hash(), 4, key_hash(4));
        source.insert_batch(blocks.clone()).unwrap();

        let (chain, bus) = test_chain();
        // Neither the timer nor the peer count triggers a sync here
        let quiet = SyncConfig {
            force_sync_interval: Duration::from_secs(3600),
            min_desired_peers: 10,
            ..SyncConfig::for_testing()
        };
        let local = handler(Arc::clone(&chain), bus, quiet);
        let remote_handler = handler(
            Arc::clone(&source),
            Arc::new(InMemoryEventBus::new()),
            SyncConfig::for_testing(),
        );
        let (_tx, shutdown) = watch::channel(false);
        Arc::clone(&local).start(shutdown).unwrap();

        // Source announces only its tip, the rest comes through sync
        connect(&local, &remote_handler).await;
        remote_handler.broadcast_block(&blocks[3]).await;

        wait_for(|| chain.head_height() == Some(4)).await;
        assert_eq!(chain.head_hash(), source.head_hash());
    }

    #[tokio::test]
    async fn test_received_transactions_are_admitted_once() {
        let (alice, bob) = (key_hash(1), key_hash(2));
        let (chain, bus) = test_chain_with(GenesisConfig {
            payout: alice,
            ..GenesisConfig::default()
        });
        let mut accepted = bus.subscribe(EventFilter::kinds(vec![EventKind::TransactionAccepted]));
        let local = handler(Arc::clone(&chain), Arc::clone(&bus), SyncConfig::for_testing());
        let remote = scripted_peer(&local, local.local_status()).await;

        let mut transfer = chain.new_transfer(&alice, bob, 10).unwrap();
        sign_transaction(&mut transfer, &signing_key(1));
        let forged = {
            let mut tx = chain.new_transfer(&alice, bob, 20).unwrap();
            sign_transaction(&mut tx, &signing_key(3));
            tx
        };

        remote
            .send(Message::Transactions(vec![transfer.clone(), forged, transfer.clone()]))
            .await
            .unwrap();
        remote.send(Message::Transactions(vec![transfer.clone()])).await.unwrap();

        let event = timeout(Duration::from_secs(5), accepted.recv()).await.unwrap();
        assert_eq!(
            event,
            Some(ChainEvent::TransactionAccepted {
                tx: transfer,
                origin: Some(REMOTE)
            })
        );
        // Let the second message drain, then check nothing else was admitted
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(accepted.try_recv(), Ok(None)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_relay_skips_origin() {
        let (chain, bus) = test_chain();
        let local = handler(Arc::clone(&chain), Arc::clone(&bus), SyncConfig::for_testing());
        let from_origin = scripted_peer(&local, local.local_status()).await;

        let other_id = PeerId([3; 32]);
        let (at_local, other) = ChannelTransport::pair(LOCAL, other_id);
        serve(&local, at_local);
        assert!(matches!(other.recv().await, Ok(Message::Status(_))));
        other.send(Message::Status(local.local_status())).await.unwrap();
        wait_for(|| local.peers().len() == 2).await;

        let tx = Transaction::coinbase(key_hash(1), 1, 99);
        let delivered = local.broadcast_transactions(vec![tx.clone()], Some(REMOTE)).await;

        assert_eq!(delivered, 1);
        assert_eq!(other.recv().await, Ok(Message::Transactions(vec![tx])));
        assert!(timeout(Duration::from_millis(50), from_origin.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (chain, bus) = test_chain();
        let local = handler(chain, bus, SyncConfig::for_testing());
        let (tx, shutdown) = watch::channel(false);

        let task = Arc::clone(&local).start(shutdown.clone()).unwrap();
        assert!(matches!(
            Arc::clone(&local).start(shutdown),
            Err(SyncError::AlreadyStarted)
        ));

        tx.send(true).unwrap();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
