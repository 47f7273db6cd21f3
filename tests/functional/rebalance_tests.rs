//! Rebalancing through the migration worker pool.

use std::collections::{BTreeMap, HashSet};

use valkey_slot_reconciler::client::{Connector, NodeClient};
use valkey_slot_reconciler::controller::{Error, WorkRouting};
use valkey_slot_reconciler::crd::ClusterTopology;
use valkey_slot_reconciler::slots::{
    SlotOwnership, plan_migrations, plan_slot_ranges,
};

use crate::mock_state::{SimCluster, SimConnector, assert_converged, ids, node_id, test_config};

/// Three nodes holding the three-node plan, plus a fourth ready node.
fn grown_cluster() -> SimCluster {
    let cluster = SimCluster::new(4, 4);
    cluster.assign(&plan_slot_ranges(3).unwrap());
    cluster
}

fn four_node_topology() -> ClusterTopology {
    ClusterTopology {
        slots: plan_slot_ranges(4).unwrap(),
        ..Default::default()
    }
}

async fn observed(cluster: &SimCluster) -> Vec<SlotOwnership> {
    let connector: SimConnector = cluster.connector();
    let client = connector.connect("10.0.0.1", 6379, None).await.unwrap();
    client.slot_ownership().await.unwrap()
}

#[tokio::test]
async fn test_rebalance_moves_every_misplaced_slot() {
    let cluster = grown_cluster();
    let expected = plan_migrations(&observed(&cluster).await, &plan_slot_ranges(4).unwrap(), &ids(4))
        .unwrap();
    let reconciler = cluster.reconciler(test_config());

    let report = reconciler
        .rebalance_cluster(&four_node_topology())
        .await
        .unwrap();

    assert_eq!(report.planned, expected.len());
    assert_eq!(report.completed() as usize, expected.len());
    assert_eq!(report.failed(), 0);
    let mut expected_slots: Vec<u16> = expected.iter().map(|m| m.slot).collect();
    expected_slots.sort_unstable();
    assert_eq!(report.migrated_slots(), expected_slots);
    assert_converged(&cluster, 4);
}

#[tokio::test]
async fn test_rebalance_with_random_routing() {
    let cluster = grown_cluster();
    let config = test_config()
        .with_routing(WorkRouting::Random)
        .with_concurrent_migrations(5);
    let reconciler = cluster.reconciler(config);

    let report = reconciler
        .rebalance_cluster(&four_node_topology())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 5);
    assert_eq!(report.completed() as usize, report.planned);
    assert_converged(&cluster, 4);
}

#[tokio::test]
async fn test_balanced_cluster_needs_no_migrations() {
    let cluster = SimCluster::new(3, 3);
    cluster.assign(&plan_slot_ranges(3).unwrap());
    let reconciler = cluster.reconciler(test_config());
    let topology = ClusterTopology {
        slots: plan_slot_ranges(3).unwrap(),
        ..Default::default()
    };

    let report = reconciler.rebalance_cluster(&topology).await.unwrap();

    assert_eq!(report.planned, 0);
    assert_eq!(report.attempted(), 0);
    assert!(cluster.events().is_empty());
}

#[tokio::test]
async fn test_keys_follow_their_slot() {
    let cluster = grown_cluster();
    // Slot 5000 moves from the first node to the second.
    cluster.put_keys(5000, 250);
    let reconciler = cluster.reconciler(test_config());

    let report = reconciler
        .rebalance_cluster(&four_node_topology())
        .await
        .unwrap();

    assert_eq!(cluster.keys_in(5000), BTreeMap::from([(node_id(1), 250)]));
    assert_eq!(cluster.migrate_calls(), 250);
    assert_eq!(cluster.delete_calls(), 0);
    assert_eq!(report.keys_migrated(), 250);
    assert_eq!(report.keys_purged(), 0);
}

#[tokio::test]
async fn test_purge_mode_never_transfers() {
    let cluster = grown_cluster();
    cluster.put_keys(5000, 250);
    let reconciler = cluster.reconciler(test_config().with_purge_keys_on_rebalance(true));

    let report = reconciler
        .rebalance_cluster(&four_node_topology())
        .await
        .unwrap();

    assert_eq!(cluster.migrate_calls(), 0);
    // Batches of 100, 100 and 50.
    assert_eq!(cluster.delete_calls(), 3);
    assert!(cluster.keys_in(5000).is_empty());
    assert_eq!(report.keys_purged(), 250);
    assert_eq!(cluster.owner_of(5000), Some(node_id(1)));
}

#[tokio::test]
async fn test_all_migrations_attempted_despite_failures() {
    let cluster = grown_cluster();
    let expected = plan_migrations(&observed(&cluster).await, &plan_slot_ranges(4).unwrap(), &ids(4))
        .unwrap();
    let failing: HashSet<u16> = [4200, 4300, 9000].into_iter().collect();
    cluster.state().fail_importing = failing.clone();
    let reconciler = cluster.reconciler(test_config());

    let err = reconciler
        .rebalance_cluster(&four_node_topology())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Protocol(_)));
    let planned: HashSet<u16> = expected.iter().map(|m| m.slot).collect();
    assert_eq!(cluster.importing_slots(), planned);
    for migration in &expected {
        let owner = cluster.owner_of(migration.slot);
        if failing.contains(&migration.slot) {
            assert_eq!(owner.as_ref(), Some(&migration.source));
        } else {
            assert_eq!(owner.as_ref(), Some(&migration.destination));
        }
    }
}

#[tokio::test]
async fn test_failed_transfer_leaves_other_slots_moving() {
    let cluster = grown_cluster();
    cluster.put_keys(5000, 10);
    // Slot 9000 moves from the second node to the third.
    cluster.put_keys(9000, 10);
    cluster.state().fail_migrate.insert(5000);
    let reconciler = cluster.reconciler(test_config());

    let err = reconciler
        .rebalance_cluster(&four_node_topology())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Protocol(_)));
    assert_eq!(cluster.keys_in(5000), BTreeMap::from([(node_id(0), 10)]));
    assert_eq!(cluster.owner_of(5000), Some(node_id(0)));
    assert_eq!(cluster.keys_in(9000), BTreeMap::from([(node_id(2), 10)]));
    assert_eq!(cluster.owner_of(9000), Some(node_id(2)));
}

#[tokio::test]
async fn test_stale_owner_fails_only_its_slot() {
    let cluster = grown_cluster();
    cluster.state().owners.insert(100, "ghost".to_string());
    let reconciler = cluster.reconciler(test_config());

    let err = reconciler
        .rebalance_cluster(&four_node_topology())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Topology(_)));
    assert_eq!(cluster.owner_of(100), Some("ghost".to_string()));
    assert_eq!(cluster.owner_of(5000), Some(node_id(1)));
}

#[tokio::test]
async fn test_too_few_ready_nodes() {
    let cluster = SimCluster::new(4, 3);
    cluster.assign(&plan_slot_ranges(3).unwrap());
    let reconciler = cluster.reconciler(test_config());

    let err = reconciler
        .rebalance_cluster(&four_node_topology())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Topology(_)));
    assert!(cluster.events().is_empty());
}

#[tokio::test]
async fn test_rebalance_without_plan_fails() {
    let cluster = grown_cluster();
    let reconciler = cluster.reconciler(test_config());

    let err = reconciler
        .rebalance_cluster(&ClusterTopology::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Topology(_)));
}

#[tokio::test]
async fn test_rebalance_records_metrics() {
    let cluster = grown_cluster();
    cluster.put_keys(5000, 5);
    let reconciler = cluster.reconciler(test_config());

    let report = reconciler
        .rebalance_cluster(&four_node_topology())
        .await
        .unwrap();

    let metrics = &reconciler.context().metrics;
    assert_eq!(metrics.keys_migrated_total.get(), 5);
    let text = metrics.encode();
    assert!(text.contains(&format!(
        r#"slot_reconciler_slot_migrations_total{{outcome="completed"}} {}"#,
        report.completed()
    )));
}
