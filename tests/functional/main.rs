// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the slot reconciler.
//!
//! These tests drive the exposed operations against an in-memory cluster
//! WITHOUT requiring a live store or Kubernetes cluster. The simulated
//! cluster counts every remote call and can be told to fail specific ones.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_scale_up_three_to_four
//! ```
//!
//! ## Test Categories
//!
//! - **Topology tests**: initial mesh formation and slot assignment
//! - **Rebalance tests**: the worker pool under success and partial failure
//! - **Registry tests**: connection caching under slow and replaced nodes
//! - **Scenario tests**: multi-step scale up and scale down

mod rebalance_tests;
mod registry_tests;

// Re-export for use in tests
pub use mock_state::*;
