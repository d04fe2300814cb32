//! # Ledger Flow Across Nodes
//!
//! A transfer built and signed on one node is relayed to a mining peer, mined
//! there, and settles on both nodes. Value is conserved: every balance is
//! backed by a coinbase.

#[cfg(test)]
mod tests {
    use super::super::{link, mining_config, node_config, wait_until};
    use fc_03_blockchain::sign_transaction;
    use fc_03_blockchain::test_utils::{key_hash, signing_key};
    use fc_03_blockchain::GenesisConfig;
    use fc_04_miner::MiningService;
    use node_runtime::{NodeConfig, NodeRuntime};

    fn with_genesis(mut config: NodeConfig, genesis: &GenesisConfig) -> NodeConfig {
        config.genesis = genesis.clone();
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transfer_is_relayed_mined_and_settled() {
        let (alice, bob, carol) = (key_hash(1), key_hash(2), key_hash(3));
        let genesis = GenesisConfig {
            payout: alice,
            ..Default::default()
        };

        // `miner` pays carol; `wallet` holds alice's genesis coins
        let miner = NodeRuntime::new(with_genesis(mining_config(carol), &genesis)).unwrap();
        let wallet = NodeRuntime::new(with_genesis(node_config(), &genesis)).unwrap();
        miner.start().await.unwrap();
        wallet.start().await.unwrap();
        link(&miner, 1, &wallet, 2);

        let (miner_sync, wallet_sync) = (miner.sync(), wallet.sync());
        wait_until("handshake", || {
            miner_sync.peers().len() == 1 && wallet_sync.peers().len() == 1
        })
        .await;

        let wallet_chain = wallet.chain();
        let mut tx = wallet_chain.new_transfer(&alice, bob, 30).unwrap();
        sign_transaction(&mut tx, &signing_key(1));
        assert_eq!(wallet_sync.broadcast_transactions(vec![tx], None).await, 1);

        wait_until("bob's coins to settle on the wallet", || {
            wallet_chain.balance_of(&bob).unwrap() == 30
        })
        .await;
        assert_eq!(wallet_chain.balance_of(&alice).unwrap(), 20);

        miner.miner().stop().await.unwrap();
        let miner_chain = miner.chain();
        wait_until("wallet to reach the miner's head", || {
            wallet_chain.head_hash() == miner_chain.head_hash()
        })
        .await;

        let height = miner_chain.head_height().unwrap();
        for chain in [&miner_chain, &wallet_chain] {
            let alice_balance = chain.balance_of(&alice).unwrap();
            let bob_balance = chain.balance_of(&bob).unwrap();
            let carol_balance = chain.balance_of(&carol).unwrap();
            assert_eq!(carol_balance, 50 * height);
            assert_eq!(alice_balance + bob_balance + carol_balance, 50 * (height + 1));
        }

        miner.shutdown().await;
        wallet.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unsigned_transfer_is_never_mined() {
        let (alice, bob) = (key_hash(1), key_hash(2));
        let genesis = GenesisConfig {
            payout: alice,
            ..Default::default()
        };

        let miner = NodeRuntime::new(with_genesis(mining_config(key_hash(3)), &genesis)).unwrap();
        let wallet = NodeRuntime::new(with_genesis(node_config(), &genesis)).unwrap();
        miner.start().await.unwrap();
        wallet.start().await.unwrap();
        link(&miner, 1, &wallet, 2);

        let (miner_sync, wallet_sync) = (miner.sync(), wallet.sync());
        wait_until("handshake", || {
            miner_sync.peers().len() == 1 && wallet_sync.peers().len() == 1
        })
        .await;

        let tx = wallet.chain().new_transfer(&alice, bob, 30).unwrap();
        wallet_sync.broadcast_transactions(vec![tx], None).await;

        // Give the miner a few blocks' worth of chances
        let miner_chain = miner.chain();
        let start = miner_chain.head_height().unwrap();
        wait_until("three more blocks", || {
            miner_chain.head_height().unwrap() >= start + 3
        })
        .await;

        assert_eq!(miner_chain.balance_of(&bob).unwrap(), 0);
        assert_eq!(miner_chain.balance_of(&alice).unwrap(), 50);
        assert_eq!(miner.miner().status().queued_transactions, 0);

        miner.shutdown().await;
        wallet.shutdown().await;
    }
}
