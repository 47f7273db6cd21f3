//! Valkey client wrapper using the fred crate.
//!
//! Each [`ValkeyClient`] talks to exactly one node over a centralized
//! connection; cluster-wide behaviour is driven by the reconciler issuing
//! commands node by node.

use std::time::Duration;

use fred::prelude::*;
use fred::types::{ClusterHash, CustomCommand, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use super::protocol::{Connector, MigrateTarget, NodeClient, SetSlotState};
use super::types::ParsedClusterNodes;
use crate::slots::{NodeId, SlotOwnership, SlotRange};

/// Errors that can occur during Valkey operations.
#[derive(Error, Debug)]
pub enum ValkeyError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] crate::client::types::ParseError),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for connecting to a Valkey node.
#[derive(Clone, Debug)]
pub struct ValkeyClientConfig {
    /// Host to connect to.
    pub host: String,
    /// Client port.
    pub port: u16,
    /// Connection timeout.
    pub connection_timeout: Duration,
    /// Command timeout.
    pub command_timeout: Duration,
    /// Password for authentication.
    pub password: Option<String>,
}

impl Default for ValkeyClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 6379,
            connection_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            password: None,
        }
    }
}

impl ValkeyClientConfig {
    /// Create a new configuration for a host.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set password. An empty password means unauthenticated.
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    /// Set connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Valkey client for a single cluster node.
pub struct ValkeyClient {
    client: Client,
}

impl ValkeyClient {
    /// Create and connect a new client.
    #[instrument(skip(config), fields(host = %config.host, port = config.port))]
    pub async fn connect(config: ValkeyClientConfig) -> Result<Self, ValkeyError> {
        if config.host.is_empty() {
            return Err(ValkeyError::InvalidConfig("No host provided".to_string()));
        }

        let redis_config = Config {
            server: ServerConfig::Centralized {
                server: Server::new(config.host.clone(), config.port),
            },
            password: config.password.clone(),
            ..Default::default()
        };

        let command_timeout = config.command_timeout;
        let connection_timeout = config.connection_timeout;

        let client = Builder::from_config(redis_config)
            .with_performance_config(|perf| {
                perf.default_command_timeout = command_timeout;
            })
            .with_connection_config(|conn| {
                conn.connection_timeout = connection_timeout;
            })
            .build()?;

        debug!("Connecting to Valkey node");
        client.init().await?;
        debug!("Connected to Valkey node");

        Ok(Self { client })
    }

    /// Get cluster nodes.
    #[instrument(skip(self))]
    pub async fn cluster_nodes_raw(&self) -> Result<String, ValkeyError> {
        let response: String = self.client.cluster_nodes().await?;
        Ok(response)
    }

    async fn cluster_command(&self, args: Vec<String>) -> Result<Value, ValkeyError> {
        let value: Value = self
            .client
            .custom(CustomCommand::new_static("CLUSTER", ClusterHash::Random, false), args)
            .await?;
        Ok(value)
    }
}

/// Build the argument list for `MIGRATE host port key 0 timeout [AUTH password]`.
pub fn migrate_args(target: &MigrateTarget, key: &str) -> Vec<String> {
    let mut args = vec![
        target.host.clone(),
        target.port.to_string(),
        key.to_string(),
        "0".to_string(),
        target.timeout.as_millis().to_string(),
    ];
    if let Some(password) = target.password.as_deref().filter(|p| !p.is_empty()) {
        args.push("AUTH".to_string());
        args.push(password.to_string());
    }
    args
}

/// Build the argument list for `CLUSTER SETSLOT`.
pub fn setslot_args(slot: u16, state: &SetSlotState) -> Vec<String> {
    let (mode, node) = match state {
        SetSlotState::Importing(id) => ("IMPORTING", id),
        SetSlotState::Migrating(id) => ("MIGRATING", id),
        SetSlotState::Node(id) => ("NODE", id),
    };
    vec![
        "SETSLOT".to_string(),
        slot.to_string(),
        mode.to_string(),
        node.clone(),
    ]
}

impl NodeClient for ValkeyClient {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<(), ValkeyError> {
        let _: String = self.client.ping(None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn my_id(&self) -> Result<NodeId, ValkeyError> {
        let id: String = self.client.cluster_myid().await?;
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn meet(&self, ip: &str, port: u16) -> Result<(), ValkeyError> {
        self.client.cluster_meet(ip, port).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(range = %range))]
    async fn add_slots_range(&self, range: SlotRange) -> Result<(), ValkeyError> {
        let slots: Vec<u16> = range.iter().collect();
        self.client.cluster_add_slots(slots).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(state = %state))]
    async fn set_slot(&self, slot: u16, state: SetSlotState) -> Result<(), ValkeyError> {
        self.cluster_command(setslot_args(slot, &state)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn keys_in_slot(&self, slot: u16, count: u64) -> Result<Vec<String>, ValkeyError> {
        let keys: Vec<String> = self.client.cluster_get_keys_in_slot(slot, count).await?;
        Ok(keys)
    }

    #[instrument(skip(self, target), fields(host = %target.host, port = target.port))]
    async fn migrate_key(&self, target: &MigrateTarget, key: &str) -> Result<(), ValkeyError> {
        let _: Value = self
            .client
            .custom(
                CustomCommand::new_static("MIGRATE", ClusterHash::Random, false),
                migrate_args(target, key),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(key_count = keys.len()))]
    async fn delete_keys(&self, keys: &[String]) -> Result<u64, ValkeyError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = self.client.del(keys.to_vec()).await?;
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn forget(&self, node_id: &str) -> Result<(), ValkeyError> {
        self.client.cluster_forget(node_id).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn slot_ownership(&self) -> Result<Vec<SlotOwnership>, ValkeyError> {
        let raw = self.cluster_nodes_raw().await?;
        Ok(ParsedClusterNodes::parse(&raw)?.slot_ownership())
    }

    async fn close(&self) -> Result<(), ValkeyError> {
        self.client.quit().await?;
        Ok(())
    }
}

/// Connector producing [`ValkeyClient`]s with shared timeouts.
#[derive(Clone, Debug)]
pub struct ValkeyConnector {
    /// Connection timeout.
    pub connection_timeout: Duration,
    /// Command timeout.
    pub command_timeout: Duration,
}

impl Default for ValkeyConnector {
    fn default() -> Self {
        let defaults = ValkeyClientConfig::default();
        Self {
            connection_timeout: defaults.connection_timeout,
            command_timeout: defaults.command_timeout,
        }
    }
}

impl Connector for ValkeyConnector {
    type Client = ValkeyClient;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        password: Option<&str>,
    ) -> Result<ValkeyClient, ValkeyError> {
        let config = ValkeyClientConfig::new(host, port)
            .with_password(password.map(str::to_string))
            .with_connection_timeout(self.connection_timeout)
            .with_command_timeout(self.command_timeout);
        ValkeyClient::connect(config).await
    }
}
