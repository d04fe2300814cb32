//! # Miner Service
//!
//! Owns the mining worker task and its queue of accepted transactions.

use crate::config::MinerConfig;
use crate::error::{MinerError, Result};
use crate::ports::inbound::{MinerStatus, MiningService};
use async_trait::async_trait;
use fc_03_blockchain::{BlockChain, ChainError};
use parking_lot::{Mutex, RwLock};
use shared_bus::{ChainEvent, EventFilter, EventKind, InMemoryEventBus, Subscription, SubscriptionError};
use shared_types::{short_hex, Hash, KeyHash, OutPoint, Transaction, ZERO_HASH};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Background block producer.
pub struct Miner {
    chain: Arc<BlockChain>,
    event_bus: Arc<InMemoryEventBus>,
    config: MinerConfig,

    /// Whether the worker should keep going
    is_active: Arc<AtomicBool>,

    /// Polled by the proof-of-work search
    interrupt: Arc<AtomicBool>,

    status: Arc<RwLock<MinerStatus>>,
    mining_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Miner {
    /// Create a stopped miner.
    pub fn new(chain: Arc<BlockChain>, event_bus: Arc<InMemoryEventBus>, config: MinerConfig) -> Self {
        Self {
            chain,
            event_bus,
            config,
            is_active: Arc::new(AtomicBool::new(false)),
            interrupt: Arc::new(AtomicBool::new(false)),
            status: Arc::new(RwLock::new(MinerStatus::default())),
            mining_handle: Mutex::new(None),
        }
    }

    /// Whether the worker is running.
    pub fn is_running(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MiningService for Miner {
    async fn start(&self, payout: KeyHash) -> Result<()> {
        if payout == ZERO_HASH {
            return Err(MinerError::NoPayoutAddress);
        }
        if self
            .is_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MinerError::AlreadyRunning);
        }

        self.interrupt.store(false, Ordering::SeqCst);
        {
            let mut status = self.status.write();
            status.running = true;
            status.payout = Some(payout);
        }

        // Subscribe before spawning so no accepted transaction slips through
        let subscription = self
            .event_bus
            .subscribe(EventFilter::kinds(vec![EventKind::TransactionAccepted]));

        let worker = MiningWorker {
            chain: Arc::clone(&self.chain),
            config: self.config.clone(),
            payout,
            is_active: Arc::clone(&self.is_active),
            interrupt: Arc::clone(&self.interrupt),
            status: Arc::clone(&self.status),
            subscription,
            queue: VecDeque::new(),
            queued: HashSet::new(),
        };

        info!(payout = %short_hex(&payout), "[fc-04] Starting miner");
        *self.mining_handle.lock() = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.is_active.swap(false, Ordering::SeqCst) {
            return Err(MinerError::NotRunning);
        }
        self.interrupt.store(true, Ordering::SeqCst);
        info!("[fc-04] Stopping miner");

        let handle = self.mining_handle.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| MinerError::Worker(e.to_string()))?;
        }

        let mut status = self.status.write();
        status.running = false;
        status.payout = None;
        Ok(())
    }

    fn status(&self) -> MinerStatus {
        self.status.read().clone()
    }
}

/// State moved into the worker task.
struct MiningWorker {
    chain: Arc<BlockChain>,
    config: MinerConfig,
    payout: KeyHash,
    is_active: Arc<AtomicBool>,
    interrupt: Arc<AtomicBool>,
    status: Arc<RwLock<MinerStatus>>,
    subscription: Subscription,
    queue: VecDeque<Transaction>,
    queued: HashSet<Hash>,
}

impl MiningWorker {
    async fn run(mut self) {
        info!("[fc-04] Mining task started");

        while self.is_active.load(Ordering::SeqCst) {
            self.drain_accepted();

            let candidate = self.assemble_candidate();
            let queued_txs: Vec<Transaction> = candidate.iter().skip(1).cloned().collect();
            let included: Vec<Hash> = queued_txs.iter().map(|tx| tx.id).collect();

            let chain = Arc::clone(&self.chain);
            let interrupt = Arc::clone(&self.interrupt);
            let outcome =
                tokio::task::spawn_blocking(move || chain.mine_block(candidate, &interrupt)).await;

            match outcome {
                Ok(Ok((hash, block))) => {
                    self.forget(&included);
                    self.status.write().blocks_mined += 1;
                    info!(
                        height = block.height,
                        hash = %short_hex(&hash),
                        txs = included.len(),
                        "[fc-04] Block mined"
                    );
                }
                Ok(Err(ChainError::Interrupted)) => {
                    debug!("[fc-04] Mining interrupted");
                }
                Ok(Err(ChainError::StaleCandidate { .. })) => {
                    self.discarded();
                    debug!("[fc-04] Stale candidate discarded, retrying");
                }
                Ok(Err(ChainError::LocalInvariant(reason))) => {
                    let rejected = self.rejected_transactions(&queued_txs);
                    self.forget(&rejected);
                    self.discarded();
                    warn!(
                        %reason,
                        dropped = rejected.len(),
                        kept = included.len() - rejected.len(),
                        "[fc-04] Candidate rejected, dropping its invalid transactions"
                    );
                }
                Ok(Err(e)) => {
                    self.discarded();
                    warn!(error = %e, "[fc-04] Failed to append candidate");
                }
                Err(e) => {
                    error!(error = %e, "[fc-04] Mining search task failed");
                    self.is_active.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }

        let mut status = self.status.write();
        status.running = false;
        status.queued_transactions = self.queue.len();
        info!("[fc-04] Mining task stopped");
    }

    fn drain_accepted(&mut self) {
        loop {
            match self.subscription.try_recv() {
                Ok(Some(ChainEvent::TransactionAccepted { tx, .. })) => {
                    if self.queued.insert(tx.id) {
                        self.queue.push_back(tx);
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(SubscriptionError::Closed) => {
                    debug!("[fc-04] Event bus closed, no more transactions");
                    break;
                }
            }
        }
        self.status.write().queued_transactions = self.queue.len();
    }

    fn assemble_candidate(&self) -> Vec<Transaction> {
        let height = self.chain.head_height().map_or(0, |h| h + 1);
        let room = self.config.max_block_transactions.saturating_sub(1);

        let mut txs = Vec::with_capacity(1 + room.min(self.queue.len()));
        txs.push(Transaction::coinbase(self.payout, self.config.coinbase_reward, height));
        txs.extend(self.queue.iter().take(room).cloned());
        txs
    }

    /// Ids of the candidate transactions that cannot go into the next block.
    ///
    /// A transaction is rejected when it fails on its own against the head,
    /// e.g. it was mined remotely, or when it spends an outpoint an earlier
    /// candidate transaction already spends.
    fn rejected_transactions(&self, txs: &[Transaction]) -> Vec<Hash> {
        let mut spent: HashSet<OutPoint> = HashSet::new();
        let mut rejected = Vec::new();

        for tx in txs {
            if let Err(e) = self.chain.verify_transaction(tx) {
                if e.is_rejection() {
                    debug!(txid = %short_hex(&tx.id), error = %e, "[fc-04] Dropping queued transaction");
                    rejected.push(tx.id);
                }
                continue;
            }
            let inputs: Vec<OutPoint> = tx.inputs.iter().map(|input| input.prev_out).collect();
            if inputs.iter().any(|outpoint| spent.contains(outpoint)) {
                debug!(txid = %short_hex(&tx.id), "[fc-04] Dropping conflicting queued transaction");
                rejected.push(tx.id);
                continue;
            }
            spent.extend(inputs);
        }
        rejected
    }

    fn forget(&mut self, ids: &[Hash]) {
        if ids.is_empty() {
            return;
        }
        let ids: HashSet<&Hash> = ids.iter().collect();
        self.queue.retain(|tx| !ids.contains(&tx.id));
        self.queued.retain(|id| !ids.contains(id));
        self.status.write().queued_transactions = self.queue.len();
    }

    fn discarded(&self) {
        self.status.write().candidates_discarded += 1;
    }
}
