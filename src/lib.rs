//! valkey-slot-reconciler library crate
//!
//! Keeps the hash-slot ownership of a Valkey/Redis cluster consistent with a
//! desired node count. The crate exports the reconciler, the store client,
//! the pure slot planning logic and the `RedisCluster` CRD.
//!
//! ```rust,ignore
//! use valkey_slot_reconciler::controller::{ClusterReconciler, Context, ReconcilerConfig};
//!
//! let config = ReconcilerConfig::from_spec(&cluster.spec);
//! let ctx = Context::new(config.valkey_connector(), config)?;
//! let reconciler = ClusterReconciler::new(ctx, membership, replicas, secret);
//!
//! let mut topology = cluster.status.clone().unwrap_or_default();
//! reconciler.scale_cluster(&mut topology).await?;
//! reconciler.update_scaling_status(&mut topology).await?;
//! ```

pub mod client;
pub mod controller;
pub mod crd;
pub mod metrics;
pub mod resources;
pub mod slots;
pub mod telemetry;

pub use controller::{ClusterReconciler, Context, Error, ReconcilerConfig, Result, ScaleOutcome};
pub use metrics::Metrics;
