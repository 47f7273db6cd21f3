//! Connection cache behaviour under slow and replaced nodes.

use std::sync::Arc;
use std::time::Duration;

use valkey_slot_reconciler::client::ClientRegistry;
use valkey_slot_reconciler::controller::membership::ReadyNode;

use crate::mock_state::{SimCluster, SimConnector, ids, node_address, node_id};

fn ready_node(index: usize, address: &str) -> ReadyNode {
    ReadyNode::new(node_id(index), format!("cache-{}", index), address)
}

fn registry(cluster: &SimCluster) -> Arc<ClientRegistry<SimConnector>> {
    Arc::new(ClientRegistry::new(cluster.connector(), 6379))
}

#[tokio::test(start_paused = true)]
async fn test_slow_connect_does_not_block_other_nodes() {
    let cluster = SimCluster::new(2, 2);
    cluster
        .state()
        .connect_delay
        .insert(node_address(0), Duration::from_secs(10));
    let registry = registry(&cluster);

    let slow = {
        let registry = Arc::clone(&registry);
        let node = ready_node(0, &node_address(0));
        tokio::spawn(async move { registry.client_for(&node, None).await.map(|_| ()) })
    };
    tokio::task::yield_now().await;

    let fast = tokio::time::timeout(
        Duration::from_secs(1),
        registry.client_for(&ready_node(1, &node_address(1)), None),
    )
    .await;
    assert!(fast.is_ok_and(|r| r.is_ok()), "second node waited on the first");

    slow.await.unwrap().unwrap();
    assert_eq!(registry.cached_nodes().await, ids(2));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_connection() {
    let cluster = SimCluster::new(1, 1);
    cluster
        .state()
        .connect_delay
        .insert(node_address(0), Duration::from_secs(2));
    let registry = registry(&cluster);

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let node = ready_node(0, &node_address(0));
            tokio::spawn(async move { registry.client_for(&node, None).await.map(|_| ()) })
        })
        .collect();
    for caller in callers {
        caller.await.unwrap().unwrap();
    }

    assert_eq!(cluster.state().connects, 1);
}

#[tokio::test]
async fn test_address_change_replaces_connection() {
    let cluster = SimCluster::new(1, 1);
    let registry = registry(&cluster);
    let first = registry
        .client_for(&ready_node(0, &node_address(0)), None)
        .await
        .unwrap();

    cluster.state().nodes[0].address = "10.0.1.1".to_string();
    let second = registry
        .client_for(&ready_node(0, "10.0.1.1"), None)
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(cluster.state().closes, vec![node_id(0)]);
    assert_eq!(registry.cached_nodes().await, vec![node_id(0)]);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_leaves_replaced_connection_alone() {
    let cluster = SimCluster::new(1, 1);
    let registry = registry(&cluster);
    let old = ready_node(0, &node_address(0));
    registry.client_for(&old, None).await.unwrap();
    {
        let mut state = cluster.state();
        state.ping_delay.insert(node_id(0), Duration::from_secs(5));
        state.fail_ping.insert(node_id(0));
    }

    // The sweep pings the old connection while the node moves.
    let sweep = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.refresh(&[old]).await })
    };
    tokio::task::yield_now().await;

    cluster.state().nodes[0].address = "10.0.1.1".to_string();
    let moved = ready_node(0, "10.0.1.1");
    let current = registry.client_for(&moved, None).await.unwrap();

    let report = sweep.await.unwrap();
    assert_eq!(report.invalidated, vec![node_id(0)]);

    // Closed once, when it was replaced.
    assert_eq!(cluster.state().closes, vec![node_id(0)]);
    let cached = registry.client_for(&moved, None).await.unwrap();
    assert!(Arc::ptr_eq(&current, &cached));
    assert_eq!(cluster.state().connects, 2);
}
