//! Custom Resource Definitions (CRDs) for the slot reconciler.
//!
//! - `RedisCluster`: desired node count plus the persisted slot topology

mod redis_cluster;

pub use redis_cluster::*;
