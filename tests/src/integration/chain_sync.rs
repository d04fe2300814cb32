//! # Chain Synchronization Between Nodes
//!
//! ## Flows Tested
//!
//! 1. A fresh node pulls the whole chain of a longer peer
//! 2. Two diverged nodes converge on the longer branch; the loser's blocks stay stored
//! 3. Blocks mined on one node reach the other through announcements
//! 4. Nodes on different networks refuse each other

#[cfg(test)]
mod tests {
    use super::super::{link, mining_config, node_config, wait_until, SCENARIO_TIMEOUT};
    use fc_03_blockchain::test_utils::key_hash;
    use fc_04_miner::MiningService;
    use node_runtime::NodeRuntime;
    use shared_types::{KeyHash, Transaction};

    fn extend(node: &NodeRuntime, count: u64, payout: KeyHash) {
        let chain = node.chain();
        for _ in 0..count {
            let height = chain.head_height().unwrap() + 1;
            chain
                .add_block(vec![Transaction::coinbase(payout, 50, height)])
                .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fresh_node_catches_up() {
        let a = NodeRuntime::new(node_config()).unwrap();
        let b = NodeRuntime::new(node_config()).unwrap();
        assert_eq!(a.genesis(), b.genesis());
        extend(&a, 30, key_hash(1));

        a.start().await.unwrap();
        b.start().await.unwrap();
        link(&a, 1, &b, 2);

        let (a_chain, b_chain) = (a.chain(), b.chain());
        wait_until("b to reach a's head", || b_chain.head_hash() == a_chain.head_hash()).await;
        assert_eq!(b_chain.head_height(), Some(30));
        assert_eq!(b_chain.iter().unwrap().count(), 31);

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_diverged_nodes_converge_on_longer_branch() {
        let a = NodeRuntime::new(node_config()).unwrap();
        let b = NodeRuntime::new(node_config()).unwrap();
        extend(&a, 20, key_hash(1));
        extend(&b, 12, key_hash(2));
        let b_old_head = b.chain().head_hash();

        a.start().await.unwrap();
        b.start().await.unwrap();
        link(&a, 1, &b, 2);

        let (a_chain, b_chain) = (a.chain(), b.chain());
        wait_until("b to adopt a's branch", || b_chain.head_hash() == a_chain.head_hash()).await;

        assert_eq!(b_chain.head_height(), Some(20));
        // The shorter branch is kept as a side branch
        assert!(b_chain.has_block(&b_old_head).unwrap());
        assert_eq!(b_chain.balance_of(&key_hash(1)).unwrap(), 20 * 50);
        assert_eq!(b_chain.balance_of(&key_hash(2)).unwrap(), 0);
        // The longer node never moves
        assert_eq!(a_chain.head_height(), Some(20));

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mined_blocks_reach_peer() {
        let a = NodeRuntime::new(mining_config(key_hash(1))).unwrap();
        let b = NodeRuntime::new(node_config()).unwrap();

        b.start().await.unwrap();
        a.start().await.unwrap();
        link(&a, 1, &b, 2);

        let b_chain = b.chain();
        wait_until("b to see 5 mined blocks", || b_chain.head_height() >= Some(5)).await;

        a.miner().stop().await.unwrap();
        let a_chain = a.chain();
        wait_until("b to settle on a's head", || b_chain.head_hash() == a_chain.head_hash()).await;
        assert_eq!(
            b_chain.balance_of(&key_hash(1)).unwrap(),
            50 * a_chain.head_height().unwrap()
        );

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_nodes_on_other_networks_stay_apart() {
        let a = NodeRuntime::new(node_config()).unwrap();
        let mut other = node_config();
        other.sync.network_id = 2;
        let b = NodeRuntime::new(other).unwrap();
        extend(&a, 3, key_hash(1));

        a.start().await.unwrap();
        b.start().await.unwrap();
        let (a_conn, b_conn) = link(&a, 1, &b, 2);

        // Both sides drop the connection after the status exchange
        tokio::time::timeout(SCENARIO_TIMEOUT, async {
            a_conn.await.unwrap();
            b_conn.await.unwrap();
        })
        .await
        .expect("connections torn down");

        assert!(a.sync().peers().is_empty());
        assert!(b.sync().peers().is_empty());
        assert_eq!(b.chain().head_height(), Some(0));

        a.shutdown().await;
        b.shutdown().await;
    }
}
