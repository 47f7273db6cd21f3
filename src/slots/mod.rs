//! Pure slot management logic for Valkey clusters.
//!
//! This module provides testable, pure functions for slot distribution and migration planning.
//! It separates the computation of "what slots to move" from "how to move them".
//!
//! ## Module Structure
//!
//! - [`distribution`]: Slot plan for N nodes
//! - [`planner`]: Owner resolution and the ownership diff
//! - [`migration`]: State tracking for the per-slot migration protocol

pub mod distribution;
pub mod migration;
pub mod planner;

// Re-export commonly used types
pub use distribution::{SlotRange, TOTAL_SLOTS, plan_slot_ranges, range_index_of};
pub use migration::{MigrationState, SlotMigrationTracker};
pub use planner::{
    ClusterSlotState, NodeId, SlotMigration, SlotOwnership, plan_migrations, resolve_slot_owner,
};
