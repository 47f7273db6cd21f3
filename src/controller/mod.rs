//! Controller module for the slot reconciler.
//!
//! Contains the exposed operations, the scale state machine, the rebalance
//! worker pool, error handling and configuration.

pub mod cluster_state_machine;
pub mod context;
pub mod error;
pub mod membership;
pub mod providers;
pub mod rebalance;
pub mod reconciler;

pub use context::{Context, ReconcilerConfig, WorkRouting};
pub use error::{Error, Result};
pub use reconciler::{ClusterReconciler, ScaleOutcome};
