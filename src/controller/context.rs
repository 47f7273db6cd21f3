//! Reconciler configuration and shared context.
//!
//! The context holds state shared across passes: the connection registry,
//! the configuration and the metrics registry.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{ClientRegistry, Connector, MigrationOptions, ValkeyConnector};
use crate::controller::error::{Error, Result};
use crate::crd::RedisClusterSpec;
use crate::metrics::Metrics;

/// Default store port for client connections, MEET and MIGRATE.
pub const DEFAULT_STORE_PORT: u16 = 6379;

/// How migration work is spread across workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkRouting {
    /// Each migration goes to a uniformly random worker.
    #[default]
    Random,
    /// Migrations go to workers in turn.
    RoundRobin,
}

/// Tunables for a reconciler.
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Port used for connections, joins and key transfers.
    pub store_port: u16,
    /// Number of migration workers.
    pub concurrent_migrations: usize,
    /// Delete keys of moved slots instead of transferring them.
    pub purge_keys_on_rebalance: bool,
    /// Keys fetched per batch while draining a slot.
    pub migration_batch_size: u64,
    /// Per-key transfer timeout.
    pub key_migrate_timeout: Duration,
    /// Wait between re-joining nodes and rebalancing after a scale-up.
    /// A heuristic for gossip to settle, not a synchronization point.
    pub settle_delay: Duration,
    /// Worker routing.
    pub routing: WorkRouting,
    /// Store connection timeout.
    pub connection_timeout: Duration,
    /// Store command timeout.
    pub command_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            store_port: DEFAULT_STORE_PORT,
            concurrent_migrations: 4,
            purge_keys_on_rebalance: false,
            migration_batch_size: 100,
            key_migrate_timeout: Duration::from_secs(1),
            settle_delay: Duration::from_secs(10),
            routing: WorkRouting::Random,
            connection_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl ReconcilerConfig {
    /// Derive a configuration from a RedisCluster spec.
    pub fn from_spec(spec: &RedisClusterSpec) -> Self {
        let defaults = Self::default();
        Self {
            purge_keys_on_rebalance: spec.purge_keys_on_rebalance,
            concurrent_migrations: spec
                .concurrent_migrations
                .unwrap_or(defaults.concurrent_migrations),
            ..defaults
        }
    }

    /// Set the store port.
    pub fn with_store_port(mut self, port: u16) -> Self {
        self.store_port = port;
        self
    }

    /// Set the number of migration workers.
    pub fn with_concurrent_migrations(mut self, workers: usize) -> Self {
        self.concurrent_migrations = workers;
        self
    }

    /// Enable or disable purge mode.
    pub fn with_purge_keys_on_rebalance(mut self, purge: bool) -> Self {
        self.purge_keys_on_rebalance = purge;
        self
    }

    /// Set the key batch size.
    pub fn with_migration_batch_size(mut self, batch_size: u64) -> Self {
        self.migration_batch_size = batch_size;
        self
    }

    /// Set the per-key transfer timeout.
    pub fn with_key_migrate_timeout(mut self, timeout: Duration) -> Self {
        self.key_migrate_timeout = timeout;
        self
    }

    /// Set the settle delay after re-joining nodes.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the worker routing.
    pub fn with_routing(mut self, routing: WorkRouting) -> Self {
        self.routing = routing;
        self
    }

    /// Reject settings the reconciler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.concurrent_migrations == 0 {
            return Err(Error::Configuration(
                "concurrent migrations must be greater than 0".to_string(),
            ));
        }
        if self.migration_batch_size == 0 {
            return Err(Error::Configuration(
                "migration batch size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Options for the migrations of one rebalance pass.
    pub fn migration_options(&self, password: Option<String>) -> MigrationOptions {
        MigrationOptions {
            purge: self.purge_keys_on_rebalance,
            batch_size: self.migration_batch_size,
            key_timeout: self.key_migrate_timeout,
            port: self.store_port,
            password,
        }
    }

    /// A `fred` connector using the configured timeouts.
    pub fn valkey_connector(&self) -> ValkeyConnector {
        ValkeyConnector {
            connection_timeout: self.connection_timeout,
            command_timeout: self.command_timeout,
        }
    }
}

/// Shared context for the reconciler
pub struct Context<C: Connector> {
    /// Connection cache shared by every component
    pub registry: Arc<ClientRegistry<C>>,
    /// Configuration
    pub config: ReconcilerConfig,
    /// Metrics
    pub metrics: Arc<Metrics>,
}

impl<C: Connector> Context<C> {
    /// Create a new context
    pub fn new(connector: C, config: ReconcilerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(ClientRegistry::new(connector, config.store_port)),
            config,
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Replace the metrics registry with a shared one
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }
}
