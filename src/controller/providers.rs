//! Collaborators the reconciler depends on but does not implement.
//!
//! Node discovery, replica-count management and credential retrieval belong
//! to the orchestration layer. The Kubernetes-backed implementations live in
//! [`crate::resources::kube_providers`].

use std::future::Future;

use super::error::Result;
use super::membership::{ReadyNode, sequence_from_name_suffix};

/// Reports which nodes are ready and how their names map to sequence indices.
pub trait MembershipProvider: Send + Sync + 'static {
    /// Nodes currently ready, with identity and address.
    fn ready_nodes(&self) -> impl Future<Output = Result<Vec<ReadyNode>>> + Send;

    /// Sequence index encoded in a node name.
    fn sequence_of(&self, name: &str) -> Option<usize> {
        sequence_from_name_suffix(name)
    }
}

/// Desired and current managed replica count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaCounts {
    /// Replica count the user asked for.
    pub desired: i32,
    /// Replica count currently configured on the workload.
    pub current: i32,
}

/// Reads and updates the managed replica count.
pub trait ReplicaCountProvider: Send + Sync + 'static {
    /// Current desired and configured counts.
    fn counts(&self) -> impl Future<Output = Result<ReplicaCounts>> + Send;

    /// Set the configured replica count.
    fn set_replicas(&self, replicas: i32) -> impl Future<Output = Result<()>> + Send;
}

/// Supplies the store credential.
pub trait SecretProvider: Send + Sync + 'static {
    /// The password, or `None` when the store is unauthenticated.
    fn password(&self) -> impl Future<Output = Result<Option<String>>> + Send;
}
