//! Ready-node membership and sequence-index mapping.
//!
//! The membership provider reports nodes in no particular order. Slot ranges
//! are bound to nodes by sequence index, which is derived from the node's
//! stable name (the StatefulSet ordinal by default).

use serde::{Deserialize, Serialize};

use crate::controller::error::{Error, Result};
use crate::slots::NodeId;

/// A node that is ready to serve traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyNode {
    /// Identity assigned by the store (`CLUSTER MYID`).
    pub node_id: NodeId,
    /// Stable name the sequence index is derived from.
    pub name: String,
    /// Address the node is reachable on.
    pub address: String,
}

impl ReadyNode {
    /// Create a new ready node.
    pub fn new(
        node_id: impl Into<NodeId>,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Parse the numeric suffix after the last `-` of a name.
///
/// ```
/// use valkey_slot_reconciler::controller::membership::sequence_from_name_suffix;
///
/// assert_eq!(sequence_from_name_suffix("redis-cluster-2"), Some(2));
/// assert_eq!(sequence_from_name_suffix("redis-cluster"), None);
/// ```
pub fn sequence_from_name_suffix(name: &str) -> Option<usize> {
    name.rsplit_once('-')
        .and_then(|(_, suffix)| suffix.parse::<usize>().ok())
}

/// Order ready nodes by sequence index.
///
/// Every index must be unique and lie in `[0, nodes.len())`; anything else
/// means discovery is lagging behind a scale change and is reported as a
/// race. A name without an index is a topology error.
pub fn nodes_by_sequence(
    nodes: &[ReadyNode],
    sequence: impl Fn(&str) -> Option<usize>,
) -> Result<Vec<ReadyNode>> {
    let mut slots: Vec<Option<ReadyNode>> = vec![None; nodes.len()];

    for node in nodes {
        let index = sequence(&node.name).ok_or_else(|| {
            Error::Topology(format!(
                "node {} has no sequence index in its name",
                node.name
            ))
        })?;

        let Some(slot) = slots.get_mut(index) else {
            return Err(Error::Race(format!(
                "node {} has sequence {} but only {} nodes are ready",
                node.name,
                index,
                nodes.len()
            )));
        };

        if let Some(existing) = slot.as_ref() {
            return Err(Error::Race(format!(
                "nodes {} and {} share sequence {}",
                existing.name, node.name, index
            )));
        }
        *slot = Some(node.clone());
    }

    // Indices are unique and in range, so every position is filled.
    Ok(slots.into_iter().flatten().collect())
}

/// Node identities in sequence order.
pub fn sequence_ids(nodes_by_sequence: &[ReadyNode]) -> Vec<NodeId> {
    nodes_by_sequence
        .iter()
        .map(|node| node.node_id.clone())
        .collect()
}

/// Find a ready node by identity.
pub fn find_node<'a>(nodes: &'a [ReadyNode], node_id: &str) -> Option<&'a ReadyNode> {
    nodes.iter().find(|node| node.node_id == node_id)
}
