//! Store capability traits.
//!
//! The reconciler only needs a handful of remote operations from each store
//! node. They are expressed as traits so the control loop can be driven by
//! the `fred`-backed [`ValkeyClient`](super::ValkeyClient) in production and
//! by an in-memory cluster in tests.

use std::future::Future;
use std::time::Duration;

use super::valkey_client::ValkeyError;
use crate::slots::{NodeId, SlotOwnership, SlotRange};

/// State argument for `CLUSTER SETSLOT`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetSlotState {
    /// Slot is being imported from the given source node.
    Importing(NodeId),
    /// Slot is being migrated to the given destination node.
    Migrating(NodeId),
    /// Slot is owned by the given node.
    Node(NodeId),
}

impl std::fmt::Display for SetSlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetSlotState::Importing(id) => write!(f, "IMPORTING {}", id),
            SetSlotState::Migrating(id) => write!(f, "MIGRATING {}", id),
            SetSlotState::Node(id) => write!(f, "NODE {}", id),
        }
    }
}

/// Where a key transfer goes.
#[derive(Clone, Debug)]
pub struct MigrateTarget {
    /// Destination host.
    pub host: String,
    /// Destination port.
    pub port: u16,
    /// Per-key timeout.
    pub timeout: Duration,
    /// Destination credential, sent as `AUTH` when set.
    pub password: Option<String>,
}

/// Remote operations on a single store node.
pub trait NodeClient: Send + Sync + 'static {
    /// Check the connection is alive.
    fn ping(&self) -> impl Future<Output = Result<(), ValkeyError>> + Send;

    /// The node's own cluster identity (`CLUSTER MYID`).
    fn my_id(&self) -> impl Future<Output = Result<NodeId, ValkeyError>> + Send;

    /// Introduce the node at `ip:port` into this node's mesh (`CLUSTER MEET`).
    fn meet(&self, ip: &str, port: u16) -> impl Future<Output = Result<(), ValkeyError>> + Send;

    /// Assign a slot range to this node.
    fn add_slots_range(
        &self,
        range: SlotRange,
    ) -> impl Future<Output = Result<(), ValkeyError>> + Send;

    /// Set the migration state of a slot on this node.
    fn set_slot(
        &self,
        slot: u16,
        state: SetSlotState,
    ) -> impl Future<Output = Result<(), ValkeyError>> + Send;

    /// Fetch up to `count` keys stored in `slot`.
    fn keys_in_slot(
        &self,
        slot: u16,
        count: u64,
    ) -> impl Future<Output = Result<Vec<String>, ValkeyError>> + Send;

    /// Move one key to another node, removing it here once copied.
    fn migrate_key(
        &self,
        target: &MigrateTarget,
        key: &str,
    ) -> impl Future<Output = Result<(), ValkeyError>> + Send;

    /// Delete keys from this node. Returns the number removed.
    fn delete_keys(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<u64, ValkeyError>> + Send;

    /// Remove a node from this node's membership view (`CLUSTER FORGET`).
    fn forget(&self, node_id: &str) -> impl Future<Output = Result<(), ValkeyError>> + Send;

    /// Slot ownership as this node sees it.
    fn slot_ownership(
        &self,
    ) -> impl Future<Output = Result<Vec<SlotOwnership>, ValkeyError>> + Send;

    /// Close the connection.
    fn close(&self) -> impl Future<Output = Result<(), ValkeyError>> + Send;
}

/// Opens connections to store nodes.
pub trait Connector: Send + Sync + 'static {
    /// Client type produced by this connector.
    type Client: NodeClient;

    /// Connect to a single node.
    fn connect(
        &self,
        host: &str,
        port: u16,
        password: Option<&str>,
    ) -> impl Future<Output = Result<Self::Client, ValkeyError>> + Send;
}
