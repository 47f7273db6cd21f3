//! RedisCluster Custom Resource Definition.
//!
//! The resource `spec` carries the desired node count and rebalance knobs; the status
//! is the persisted [`ClusterTopology`] the reconciler reads and updates on
//! every pass.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::controller::membership::ReadyNode;
use crate::slots::SlotRange;

/// RedisCluster is a custom resource for a hash-slot sharded cluster.
///
/// Example:
/// ```yaml
/// apiVersion: cache.valkey.io/v1alpha1
/// kind: RedisCluster
/// metadata:
///   name: my-cluster
/// spec:
///   replicas: 3
///   purgeKeysOnRebalance: false
///   concurrentMigrations: 4
///   auth:
///     secretName: my-cluster-auth
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cache.valkey.io",
    version = "v1alpha1",
    kind = "RedisCluster",
    plural = "redisclusters",
    shortname = "rdc",
    status = "ClusterTopology",
    namespaced,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterSpec {
    /// Number of primary nodes. Each owns one contiguous slot range.
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Delete keys of moved slots instead of transferring them.
    #[serde(default)]
    pub purge_keys_on_rebalance: bool,

    /// Number of slot migrations run in parallel during a rebalance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_migrations: Option<usize>,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthSpec,
}

fn default_replicas() -> i32 {
    3
}

/// Authentication configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
    /// Secret holding the password under key `requirepass`.
    /// Empty means the store is unauthenticated.
    #[serde(default)]
    pub secret_name: String,
}

/// Scaling status of a cluster.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ClusterStatus {
    /// Member count matches the desired count and ownership is settled.
    #[default]
    Ready,
    /// Nodes are being added.
    ScalingUp,
    /// Nodes are being removed.
    ScalingDown,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterStatus::Ready => write!(f, "Ready"),
            ClusterStatus::ScalingUp => write!(f, "ScalingUp"),
            ClusterStatus::ScalingDown => write!(f, "ScalingDown"),
        }
    }
}

/// A node observed ready during the last pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNodeStatus {
    /// Cluster node identifier.
    pub node_id: String,
    /// Pod name.
    pub name: String,
    /// Pod address.
    pub address: String,
}

impl From<&ReadyNode> for ClusterNodeStatus {
    fn from(node: &ReadyNode) -> Self {
        Self {
            node_id: node.node_id.clone(),
            name: node.name.clone(),
            address: node.address.clone(),
        }
    }
}

/// Persisted cluster topology.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTopology {
    /// Current scaling status.
    #[serde(default)]
    pub status: ClusterStatus,

    /// Target slot ranges; range `k` belongs to the node with sequence `k`.
    #[serde(default)]
    pub slots: Vec<SlotRange>,

    /// Nodes observed ready during the last pass.
    #[serde(default)]
    pub nodes: Vec<ClusterNodeStatus>,
}

impl ClusterTopology {
    /// Record the ready nodes observed in this pass.
    pub fn record_nodes(&mut self, nodes: &[ReadyNode]) {
        self.nodes = nodes.iter().map(ClusterNodeStatus::from).collect();
    }

    /// Number of nodes observed ready during the last pass.
    pub fn observed_ready(&self) -> usize {
        self.nodes.len()
    }
}
