//! Common labels and selectors for the pods backing a cluster.

use std::collections::BTreeMap;

/// Field manager name used for patches.
pub const FIELD_MANAGER: &str = "valkey-slot-reconciler";

/// Label carrying the owning cluster's name.
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Label marking pods as cluster nodes.
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// Component value of cluster node pods.
pub const NODE_COMPONENT: &str = "redis-cluster-node";

/// Labels identifying the node pods of a cluster.
pub fn pod_selector_labels(cluster_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(INSTANCE_LABEL.to_string(), cluster_name.to_string());
    labels.insert(COMPONENT_LABEL.to_string(), NODE_COMPONENT.to_string());
    labels
}

/// Label selector string for the node pods of a cluster.
pub fn pod_selector(cluster_name: &str) -> String {
    pod_selector_labels(cluster_name)
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
