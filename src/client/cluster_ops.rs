//! High-level cluster operations built from single-node commands.
//!
//! - [`form_mesh`]: join every ready node through one anchor
//! - [`assign_slots`]: initial slot assignment by sequence
//! - [`retire_surplus_nodes`]: forget nodes beyond the slot plan

use tracing::{debug, info, instrument, warn};

use super::protocol::{Connector, NodeClient};
use super::registry::ClientRegistry;
use crate::controller::error::{Error, Result};
use crate::controller::membership::ReadyNode;
use crate::slots::{ClusterSlotState, NodeId, SlotRange};

/// Join every ready node into the mesh.
///
/// The first node is the anchor and issues `CLUSTER MEET` to each other
/// node. Gossip spreads the full membership afterwards, so a star is
/// enough. Stops at the first failed join; already-joined nodes stay joined.
/// Returns the number of joins issued.
#[instrument(skip_all, fields(nodes = nodes.len()))]
pub async fn form_mesh<C: Connector>(
    registry: &ClientRegistry<C>,
    nodes: &[ReadyNode],
    password: Option<&str>,
) -> Result<usize> {
    let Some((anchor, others)) = nodes.split_first() else {
        debug!("No ready nodes, nothing to join");
        return Ok(0);
    };

    let client = registry.client_for(anchor, password).await?;
    let port = registry.port();

    for node in others {
        debug!(anchor = %anchor.node_id, node_id = %node.node_id, address = %node.address, "Executing CLUSTER MEET");
        client.meet(&node.address, port).await.map_err(|e| {
            warn!(node_id = %node.node_id, error = %e, "CLUSTER MEET failed");
            Error::from(e)
        })?;
    }

    info!(anchor = %anchor.node_id, joined = others.len(), "Cluster mesh formed");
    Ok(others.len())
}

/// Assign each range of `plan` to the node with the same sequence index.
///
/// Slots some node already owns are skipped, so a pass interrupted part way
/// can simply be re-run. Fails on the first node that rejects its range.
/// Returns the ranges actually added.
#[instrument(skip_all, fields(nodes = nodes_by_sequence.len(), ranges = plan.len()))]
pub async fn assign_slots<C: Connector>(
    registry: &ClientRegistry<C>,
    nodes_by_sequence: &[ReadyNode],
    plan: &[SlotRange],
    password: Option<&str>,
) -> Result<Vec<SlotRange>> {
    if nodes_by_sequence.len() < plan.len() {
        return Err(Error::Topology(format!(
            "{} slot ranges need {} nodes but only {} are ready",
            plan.len(),
            plan.len(),
            nodes_by_sequence.len()
        )));
    }
    let Some(first) = nodes_by_sequence.first() else {
        return Ok(Vec::new());
    };

    let observed = registry
        .client_for(first, password)
        .await?
        .slot_ownership()
        .await?;
    let state = ClusterSlotState::from_ownership(&observed);

    let mut added = Vec::new();
    for (node, range) in nodes_by_sequence.iter().zip(plan) {
        let runs = unassigned_runs(*range, &state);
        if runs.is_empty() {
            debug!(node_id = %node.node_id, range = %range, "Range already assigned");
            continue;
        }
        let client = registry.client_for(node, password).await?;
        for run in runs {
            debug!(node_id = %node.node_id, range = %run, "Adding slot range");
            client.add_slots_range(run).await?;
            added.push(run);
        }
    }

    info!(added = added.len(), "Slot assignment complete");
    Ok(added)
}

/// Sub-ranges of `range` that no node owns yet.
pub fn unassigned_runs(range: SlotRange, state: &ClusterSlotState) -> Vec<SlotRange> {
    let mut runs = Vec::new();
    let mut current: Option<SlotRange> = None;

    for slot in range.iter() {
        if state.owner_of(slot).is_some() {
            if let Some(run) = current.take() {
                runs.push(run);
            }
            continue;
        }
        current = Some(match current {
            Some(run) => SlotRange::new(run.start, slot),
            None => SlotRange::single(slot),
        });
    }
    runs.extend(current);
    runs
}

/// A failed `CLUSTER FORGET` for one (retained, surplus) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgetFailure {
    /// Node that was asked to forget.
    pub target: NodeId,
    /// Node that should have been forgotten.
    pub forgotten: NodeId,
    /// Error description.
    pub error: String,
}

/// Outcome of retiring surplus nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetirementReport {
    /// Nodes kept in the cluster.
    pub retained: Vec<NodeId>,
    /// Nodes beyond the slot plan.
    pub surplus: Vec<NodeId>,
    /// (retained, surplus) pairs successfully forgotten.
    pub forgotten: Vec<(NodeId, NodeId)>,
    /// Pairs whose forget failed.
    pub failures: Vec<ForgetFailure>,
    /// Surplus nodes whose cached client was dropped.
    pub dropped: Vec<NodeId>,
}

impl RetirementReport {
    /// Number of forget attempts made.
    pub fn attempts(&self) -> usize {
        self.forgotten.len() + self.failures.len()
    }

    /// Check whether every pair was forgotten.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Make every retained node forget every surplus node.
///
/// Nodes with a sequence index below `range_count` are retained. Each pair
/// is attempted exactly once; failures are logged and collected rather than
/// aborting the sweep. Cached clients of surplus nodes are dropped at the end.
#[instrument(skip_all, fields(range_count = range_count, nodes = nodes_by_sequence.len()))]
pub async fn retire_surplus_nodes<C: Connector>(
    registry: &ClientRegistry<C>,
    range_count: usize,
    nodes_by_sequence: &[ReadyNode],
    password: Option<&str>,
) -> RetirementReport {
    let split = range_count.min(nodes_by_sequence.len());
    let (retained, surplus) = nodes_by_sequence.split_at(split);

    let mut report = RetirementReport {
        retained: retained.iter().map(|n| n.node_id.clone()).collect(),
        surplus: surplus.iter().map(|n| n.node_id.clone()).collect(),
        ..Default::default()
    };

    for target in retained {
        for gone in surplus {
            let outcome = match registry.client_for(target, password).await {
                Ok(client) => client.forget(&gone.node_id).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    debug!(retained = %target.node_id, forgotten = %gone.node_id, "Node forgotten");
                    report
                        .forgotten
                        .push((target.node_id.clone(), gone.node_id.clone()));
                }
                Err(e) => {
                    warn!(retained = %target.node_id, forgotten = %gone.node_id, error = %e, "Node forget failed");
                    report.failures.push(ForgetFailure {
                        target: target.node_id.clone(),
                        forgotten: gone.node_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    for gone in surplus {
        registry.remove(&gone.node_id).await;
        report.dropped.push(gone.node_id.clone());
    }

    info!(
        surplus = report.surplus.len(),
        forgotten = report.forgotten.len(),
        failed = report.failures.len(),
        "Surplus nodes retired"
    );
    report
}
