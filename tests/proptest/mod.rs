// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for valkey-slot-reconciler.
//!
//! Uses proptest to generate random inputs and verify invariants.

use std::collections::HashMap;

use proptest::prelude::*;

use valkey_slot_reconciler::controller::Error;
use valkey_slot_reconciler::controller::cluster_state_machine::project_status;
use valkey_slot_reconciler::controller::membership::{ReadyNode, nodes_by_sequence, sequence_from_name_suffix};
use valkey_slot_reconciler::crd::ClusterStatus;
use valkey_slot_reconciler::slots::{
    NodeId, SlotOwnership, TOTAL_SLOTS, plan_migrations, plan_slot_ranges, range_index_of,
    resolve_slot_owner,
};

/// Strategy for generating node counts.
fn node_count() -> impl Strategy<Value = usize> {
    1..=512usize
}

/// Strategy for generating slots.
fn any_slot() -> impl Strategy<Value = u16> {
    0..TOTAL_SLOTS
}

fn any_status() -> impl Strategy<Value = ClusterStatus> {
    prop_oneof![
        Just(ClusterStatus::Ready),
        Just(ClusterStatus::ScalingUp),
        Just(ClusterStatus::ScalingDown),
    ]
}

fn ids(count: usize) -> Vec<NodeId> {
    (0..count).map(|i| format!("node-{}", i)).collect()
}

proptest! {
    /// The plan partitions the slot space into exactly N contiguous ranges.
    #[test]
    fn plan_partitions_slot_space(n in node_count()) {
        let plan = plan_slot_ranges(n).unwrap();
        prop_assert_eq!(plan.len(), n);
        prop_assert_eq!(plan[0].start, 0);
        prop_assert_eq!(plan[n - 1].end, TOTAL_SLOTS - 1);
        for pair in plan.windows(2) {
            prop_assert_eq!(pair[0].end + 1, pair[1].start);
        }
        let total: u32 = plan.iter().map(|r| u32::from(r.count())).sum();
        prop_assert_eq!(total, u32::from(TOTAL_SLOTS));
    }

    /// Range sizes differ by at most one slot.
    #[test]
    fn plan_is_even(n in node_count()) {
        let plan = plan_slot_ranges(n).unwrap();
        let sizes: Vec<u16> = plan.iter().map(|r| r.count()).collect();
        let min = *sizes.iter().min().unwrap();
        let max = *sizes.iter().max().unwrap();
        prop_assert!(max - min <= 1);
    }

    /// The plan depends only on N.
    #[test]
    fn plan_is_deterministic(n in node_count()) {
        prop_assert_eq!(plan_slot_ranges(n).unwrap(), plan_slot_ranges(n).unwrap());
    }

    /// The resolved owner is the node at the index of the containing range.
    #[test]
    fn resolver_returns_node_at_range_index(n in node_count(), slot in any_slot()) {
        let plan = plan_slot_ranges(n).unwrap();
        let nodes = ids(n);
        let index = range_index_of(&plan, slot).unwrap();
        let owner = resolve_slot_owner(slot, &nodes, &plan).unwrap();
        prop_assert_eq!(owner, Some(&nodes[index]));
    }

    /// Missing nodes at the resolved index are a topology error.
    #[test]
    fn resolver_errors_without_live_node(n in 2..=512usize, slot in any_slot()) {
        let plan = plan_slot_ranges(n).unwrap();
        let index = range_index_of(&plan, slot).unwrap();
        let nodes = ids(index);
        let result = resolve_slot_owner(slot, &nodes, &plan);
        prop_assert!(matches!(result, Err(Error::Topology(_))));
    }

    /// Applying the planned migrations yields the target ownership.
    #[test]
    fn migrations_converge(from in 1..=16usize, to in 1..=16usize) {
        let nodes = ids(from.max(to));
        let observed: Vec<SlotOwnership> = plan_slot_ranges(from)
            .unwrap()
            .into_iter()
            .zip(nodes.iter())
            .map(|(range, owner)| SlotOwnership::new(range, owner.clone()))
            .collect();
        let target = plan_slot_ranges(to).unwrap();

        let mut owners: HashMap<u16, NodeId> = HashMap::new();
        for entry in &observed {
            for slot in entry.range.iter() {
                owners.insert(slot, entry.owner.clone());
            }
        }
        let migrations = plan_migrations(&observed, &target, &nodes).unwrap();
        for migration in &migrations {
            prop_assert_eq!(owners.get(&migration.slot), Some(&migration.source));
            prop_assert_ne!(&migration.source, &migration.destination);
            owners.insert(migration.slot, migration.destination.clone());
        }
        for slot in 0..TOTAL_SLOTS {
            let desired = resolve_slot_owner(slot, &nodes, &target).unwrap();
            prop_assert_eq!(owners.get(&slot), desired);
        }
    }

    /// Sequence ordering is independent of discovery order.
    #[test]
    fn nodes_by_sequence_sorts_any_permutation(
        order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let nodes: Vec<ReadyNode> = order
            .iter()
            .map(|i| ReadyNode::new(format!("id-{}", i), format!("cache-{}", i), format!("10.0.0.{}", i)))
            .collect();
        let sorted = nodes_by_sequence(&nodes, sequence_from_name_suffix).unwrap();
        let names: Vec<String> = sorted.iter().map(|n| n.name.clone()).collect();
        let expected: Vec<String> = (0..8).map(|i| format!("cache-{}", i)).collect();
        prop_assert_eq!(names, expected);
    }

    /// Status projection matches the count comparison.
    #[test]
    fn status_follows_counts(
        prior in any_status(),
        desired in 0..20i32,
        current in 0..20i32,
        ready in 0..20i32,
    ) {
        let next = project_status(prior, desired, current, ready);
        if desired < current {
            prop_assert_eq!(next, ClusterStatus::ScalingDown);
        } else if desired > current {
            prop_assert_eq!(next, ClusterStatus::ScalingUp);
        } else {
            match prior {
                ClusterStatus::ScalingDown | ClusterStatus::Ready => {
                    prop_assert_eq!(next, ClusterStatus::Ready)
                }
                ClusterStatus::ScalingUp if ready == desired => {
                    prop_assert_eq!(next, ClusterStatus::Ready)
                }
                ClusterStatus::ScalingUp => prop_assert_eq!(next, ClusterStatus::ScalingUp),
            }
        }
    }
}
