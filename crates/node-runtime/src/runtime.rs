//! # Node Runtime
//!
//! Owns the subsystem instances and the tasks that drive them.
//!
//! ## Startup Sequence
//!
//! 1. Open storage
//! 2. Bootstrap the chain (mine genesis on an empty store)
//! 3. Start the sync handler's timer and relay loops
//! 4. Start the miner, if enabled
//!
//! Shutdown runs in reverse: the miner stops first, then the shutdown signal
//! ends the sync loops and every peer connection.

use crate::adapters::open_store;
use crate::container::config::NodeConfig;
use anyhow::{Context, Result};
use fc_01_proof_of_work::ProofOfWork;
use fc_02_chain_store::{ChainStore, KeyValueStore};
use fc_03_blockchain::{BlockChain, EcdsaScriptVerifier};
use fc_04_miner::{Miner, MinerConfig, MiningService};
use fc_05_chain_sync::{PeerTransport, SyncHandler};
use parking_lot::Mutex;
use shared_bus::InMemoryEventBus;
use shared_types::{short_hex, Hash};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A wired node.
pub struct NodeRuntime {
    config: NodeConfig,
    chain: Arc<BlockChain>,
    event_bus: Arc<InMemoryEventBus>,
    miner: Arc<Miner>,
    sync: Arc<SyncHandler>,
    genesis: Hash,
    /// Shutdown signal sender
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver (cloned into every task)
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NodeRuntime {
    /// Open the configured storage and bootstrap the chain.
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate().context("invalid node configuration")?;
        let kv = open_store(&config.storage).with_context(|| {
            format!(
                "failed to open {} storage in {}",
                config.storage.backend,
                config.storage.data_dir.display()
            )
        })?;
        Self::with_store(config, kv)
    }

    /// Wire the node over an already opened key-value engine.
    pub fn with_store(config: NodeConfig, kv: Arc<dyn KeyValueStore>) -> Result<Self> {
        info!("Creating Forge-Chain node runtime");

        let event_bus = Arc::new(InMemoryEventBus::new());
        let chain = Arc::new(BlockChain::new(
            ChainStore::new(kv),
            ProofOfWork::new(&config.pow),
            Arc::new(EcdsaScriptVerifier::new()),
            event_bus.clone(),
            config.chain.clone(),
        ));
        let genesis = chain
            .bootstrap(&config.genesis)
            .context("failed to bootstrap the chain")?;

        let miner = Arc::new(Miner::new(
            chain.clone(),
            event_bus.clone(),
            MinerConfig {
                max_block_transactions: config.chain.max_block_transactions,
                coinbase_reward: config.chain.coinbase_reward,
            },
        ));
        let sync = Arc::new(SyncHandler::new(
            chain.clone(),
            event_bus.clone(),
            config.sync.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            chain,
            event_bus,
            miner,
            sync,
            genesis,
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the sync loops and, if configured, the miner.
    pub async fn start(&self) -> Result<()> {
        info!("===========================================");
        info!("  Forge-Chain Node Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");
        info!("Genesis:    {}", short_hex(&self.genesis));
        info!(
            "Head:       {} at height {}",
            short_hex(&self.chain.head_hash()),
            self.chain.head_height().unwrap_or_default()
        );
        info!("Network id: {}", self.config.sync.network_id);
        info!("Storage:    {}", self.config.storage.backend);

        let handle = self
            .sync
            .clone()
            .start(self.shutdown_rx.clone())
            .context("failed to start chain sync")?;
        self.tasks.lock().push(handle);

        if self.config.mining.enabled {
            let payout = self
                .config
                .mining
                .payout
                .context("mining enabled without a payout address")?;
            self.miner
                .start(payout)
                .await
                .context("failed to start the miner")?;
        }

        info!("Node started");
        Ok(())
    }

    /// Serve a peer connection until it ends or the node shuts down.
    pub fn connect(&self, transport: Arc<dyn PeerTransport>) -> JoinHandle<()> {
        let sync = self.sync.clone();
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let peer = transport.peer_id();
            let connection = sync.handle(transport.clone());
            tokio::pin!(connection);

            let outcome = tokio::select! {
                outcome = &mut connection => outcome,
                _ = shutdown.changed() => {
                    // Closing the transport ends the dispatch loop, which unregisters the peer
                    transport.close();
                    connection.await
                }
            };
            match outcome {
                Ok(()) => debug!(%peer, "Connection ended"),
                Err(e) => warn!(%peer, "Connection dropped: {}", e),
            }
        })
    }

    /// Stop the miner, signal every task and wait for them.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        if self.miner.is_running() {
            if let Err(e) = self.miner.stop().await {
                warn!("[fc-04] Miner did not stop cleanly: {}", e);
            }
        }

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Task failed during shutdown: {}", e);
            }
        }

        info!("Shutdown complete");
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> Arc<BlockChain> {
        Arc::clone(&self.chain)
    }

    pub fn event_bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn miner(&self) -> Arc<Miner> {
        Arc::clone(&self.miner)
    }

    pub fn sync(&self) -> Arc<SyncHandler> {
        Arc::clone(&self.sync)
    }

    /// Hash of the genesis block.
    pub fn genesis(&self) -> Hash {
        self.genesis
    }
}
