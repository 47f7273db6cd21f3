//! Store client module for slot management operations.
//!
//! ## Architecture
//!
//! - `protocol`: Capability traits for a single store node and a connector
//! - `valkey_client`: `fred`-backed implementation of those traits
//! - `types`: Parser for `CLUSTER NODES` output
//! - `registry`: Per-node connection cache
//! - `cluster_ops`: Mesh formation, slot assignment and node retirement
//! - `scaling`: The per-slot migration protocol
//!
//! ## Example
//!
//! ```rust,ignore
//! use valkey_slot_reconciler::client::{ClientRegistry, ValkeyConnector};
//!
//! let registry = ClientRegistry::new(ValkeyConnector::default(), 6379);
//! let client = registry.client_for(&node, None).await?;
//! let ownership = client.slot_ownership().await?;
//! ```

pub mod cluster_ops;
pub mod protocol;
pub mod registry;
pub mod scaling;
pub mod types;
pub mod valkey_client;

pub use cluster_ops::{
    ForgetFailure, RetirementReport, assign_slots, form_mesh, retire_surplus_nodes,
};
pub use protocol::{Connector, MigrateTarget, NodeClient, SetSlotState};
pub use registry::{ClientHandle, ClientRegistry, RefreshReport};
pub use scaling::{MigrationOptions, migrate_slot};
pub use types::{ClusterNode, NodeFlags, ParseError, ParsedClusterNodes};
pub use valkey_client::{ValkeyClient, ValkeyClientConfig, ValkeyConnector, ValkeyError};
