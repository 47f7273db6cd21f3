//! Slot migration planning - computes what needs to change, no I/O.
//!
//! This module provides pure functions for resolving the desired owner of a
//! slot and diffing observed ownership against a target slot plan.

use std::collections::HashMap;

use super::distribution::{SlotRange, range_index_of};
use crate::controller::error::{Error, Result};

/// Identifies a node by its Valkey cluster node ID.
pub type NodeId = String;

/// A contiguous range of slots and the node currently serving it,
/// as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOwnership {
    /// Slots covered.
    pub range: SlotRange,
    /// Node ID of the owner.
    pub owner: NodeId,
}

impl SlotOwnership {
    /// Create a new ownership entry.
    pub fn new(range: SlotRange, owner: impl Into<NodeId>) -> Self {
        Self {
            range,
            owner: owner.into(),
        }
    }
}

/// Current ownership of slots in the cluster, flattened per slot.
#[derive(Debug, Clone, Default)]
pub struct ClusterSlotState {
    /// Map from slot number to owning node ID.
    pub slot_to_node: HashMap<u16, NodeId>,
}

impl ClusterSlotState {
    /// Create a new empty slot state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the per-slot view from observed ranges.
    pub fn from_ownership(ownership: &[SlotOwnership]) -> Self {
        let mut state = Self::new();
        for entry in ownership {
            for slot in entry.range.iter() {
                state.slot_to_node.insert(slot, entry.owner.clone());
            }
        }
        state
    }

    /// Get the node owning a slot, if any.
    pub fn owner_of(&self, slot: u16) -> Option<&NodeId> {
        self.slot_to_node.get(&slot)
    }

}

/// A single slot that has to move between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotMigration {
    /// The slot to migrate.
    pub slot: u16,
    /// The node currently owning the slot.
    pub source: NodeId,
    /// The node that should own the slot.
    pub destination: NodeId,
}

impl SlotMigration {
    /// Create a new slot migration.
    pub fn new(slot: u16, source: impl Into<NodeId>, destination: impl Into<NodeId>) -> Self {
        Self {
            slot,
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Resolve the node that should own `slot` under the `target` plan.
///
/// Range `k` of the plan belongs to the node with sequence index `k`.
/// Returns `Ok(None)` when no range contains the slot, and a topology error
/// when the plan expects a node at an index that has no live node.
pub fn resolve_slot_owner<'a>(
    slot: u16,
    nodes_by_sequence: &'a [NodeId],
    target: &[SlotRange],
) -> Result<Option<&'a NodeId>> {
    let Some(index) = range_index_of(target, slot) else {
        return Ok(None);
    };
    nodes_by_sequence.get(index).map(Some).ok_or_else(|| {
        Error::Topology(format!(
            "slot {} belongs to node sequence {} but only {} nodes are live",
            slot,
            index,
            nodes_by_sequence.len()
        ))
    })
}

/// Diff observed ownership against the target plan.
///
/// Every slot in every observed range is resolved to its desired owner; slots
/// already on the right node are skipped. The result is ordered by observed
/// range, then by slot.
pub fn plan_migrations(
    observed: &[SlotOwnership],
    target: &[SlotRange],
    nodes_by_sequence: &[NodeId],
) -> Result<Vec<SlotMigration>> {
    let mut migrations = Vec::new();
    for entry in observed {
        for slot in entry.range.iter() {
            let Some(desired) = resolve_slot_owner(slot, nodes_by_sequence, target)? else {
                continue;
            };
            if *desired == entry.owner {
                continue;
            }
            migrations.push(SlotMigration::new(slot, entry.owner.clone(), desired.clone()));
        }
    }
    Ok(migrations)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::slots::distribution::plan_slot_ranges;

    fn node_ids(count: usize) -> Vec<NodeId> {
        (0..count).map(|i| format!("node-{}", i)).collect()
    }

    fn balanced(count: usize) -> Vec<SlotOwnership> {
        plan_slot_ranges(count)
            .unwrap()
            .into_iter()
            .zip(node_ids(count))
            .map(|(range, id)| SlotOwnership::new(range, id))
            .collect()
    }

    #[test]
    fn test_cluster_slot_state_from_ownership() {
        let state = ClusterSlotState::from_ownership(&[SlotOwnership::new(
            SlotRange::new(0, 99),
            "node-a",
        )]);
        assert_eq!(state.owner_of(0), Some(&"node-a".to_string()));
        assert_eq!(state.owner_of(100), None);
    }

    #[test]
    fn test_resolve_slot_owner() {
        let target = plan_slot_ranges(3).unwrap();
        let nodes = node_ids(3);
        assert_eq!(resolve_slot_owner(0, &nodes, &target).unwrap(), Some(&nodes[0]));
        assert_eq!(resolve_slot_owner(5461, &nodes, &target).unwrap(), Some(&nodes[1]));
        assert_eq!(resolve_slot_owner(16383, &nodes, &target).unwrap(), Some(&nodes[2]));
    }

    #[test]
    fn test_resolve_slot_owner_missing_node_is_topology_error() {
        let target = plan_slot_ranges(4).unwrap();
        let nodes = node_ids(3);
        let err = resolve_slot_owner(16383, &nodes, &target).unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
        // Slots served by existing sequences still resolve.
        assert!(resolve_slot_owner(0, &nodes, &target).is_ok());
    }

    #[test]
    fn test_resolve_slot_owner_without_matching_range() {
        let target = vec![SlotRange::new(0, 10)];
        let nodes = node_ids(1);
        assert_eq!(resolve_slot_owner(11, &nodes, &target).unwrap(), None);
    }

    #[test]
    fn test_plan_migrations_no_op_when_balanced() {
        let target = plan_slot_ranges(3).unwrap();
        let plan = plan_migrations(&balanced(3), &target, &node_ids(3)).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_migrations_scale_up() {
        let target = plan_slot_ranges(4).unwrap();
        let plan = plan_migrations(&balanced(3), &target, &node_ids(4)).unwrap();

        // Every slot of the fourth range has to move onto node-3.
        let to_new: Vec<_> = plan.iter().filter(|m| m.destination == "node-3").collect();
        assert_eq!(to_new.len(), target[3].count() as usize);
        assert!(plan.iter().all(|m| m.source != m.destination));
        assert!(plan.iter().all(|m| m.source != "node-3"));
    }

    #[test]
    fn test_plan_migrations_scale_down_evacuates_surplus() {
        let target = plan_slot_ranges(3).unwrap();
        let plan = plan_migrations(&balanced(4), &target, &node_ids(4)).unwrap();

        let from_surplus = plan.iter().filter(|m| m.source == "node-3").count();
        assert_eq!(from_surplus, plan_slot_ranges(4).unwrap()[3].count() as usize);
        assert!(plan.iter().all(|m| m.destination != "node-3"));
    }

    #[test]
    fn test_plan_migrations_unresolvable_owner() {
        let target = plan_slot_ranges(4).unwrap();
        let err = plan_migrations(&balanced(3), &target, &node_ids(3)).unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
    }
}
