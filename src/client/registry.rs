//! Per-node connection cache.
//!
//! The registry lazily opens one connection per node identity and hands out
//! shared references to it. A cached connection is replaced when the node's
//! address changes and dropped when it stops answering pings.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::protocol::{Connector, NodeClient};
use super::valkey_client::ValkeyError;
use crate::controller::membership::ReadyNode;
use crate::slots::NodeId;

/// A cached connection to one node.
pub struct ClientHandle<T> {
    /// Cluster identity of the node.
    pub node_id: NodeId,
    /// Address the connection was opened against.
    pub address: String,
    /// The connection.
    pub client: Arc<T>,
}

impl<T> Clone for ClientHandle<T> {
    fn clone(&self) -> Self {
        Self {
            node_id: self.node_id.clone(),
            address: self.address.clone(),
            client: Arc::clone(&self.client),
        }
    }
}

/// Outcome of a refresh sweep over the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Nodes whose cached connection answered a ping.
    pub healthy: Vec<NodeId>,
    /// Nodes whose cached connection was dropped.
    pub invalidated: Vec<NodeId>,
}

/// Cache of store connections keyed by node identity.
pub struct ClientRegistry<C: Connector> {
    connector: C,
    port: u16,
    handles: Mutex<HashMap<NodeId, ClientHandle<C::Client>>>,
    /// Per-node gates serializing connects to the same node.
    connecting: Mutex<HashMap<NodeId, Arc<Mutex<()>>>>,
}

impl<C: Connector> ClientRegistry<C> {
    /// Create an empty registry connecting on `port`.
    pub fn new(connector: C, port: u16) -> Self {
        Self {
            connector,
            port,
            handles: Mutex::new(HashMap::new()),
            connecting: Mutex::new(HashMap::new()),
        }
    }

    /// The connector used to open connections.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The port every connection is opened on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the connection for a node, opening it if missing or stale.
    ///
    /// Connects to the same node are serialized so two workers never open two
    /// connections to it. The cache lock is not held while connecting, so a
    /// slow node does not hold up callers asking for other nodes.
    #[instrument(skip(self, node, password), fields(node_id = %node.node_id, address = %node.address))]
    pub async fn client_for(
        &self,
        node: &ReadyNode,
        password: Option<&str>,
    ) -> Result<Arc<C::Client>, ValkeyError> {
        if let Some(client) = self.cached(node).await {
            return Ok(client);
        }

        let gate = {
            let mut gates = self.connecting.lock().await;
            Arc::clone(gates.entry(node.node_id.clone()).or_default())
        };
        let _connecting = gate.lock().await;

        // Another caller may have connected while we waited on the gate.
        if let Some(client) = self.cached(node).await {
            return Ok(client);
        }

        let client = Arc::new(
            self.connector
                .connect(&node.address, self.port, password)
                .await?,
        );
        let replaced = self.handles.lock().await.insert(
            node.node_id.clone(),
            ClientHandle {
                node_id: node.node_id.clone(),
                address: node.address.clone(),
                client: Arc::clone(&client),
            },
        );
        if let Some(stale) = replaced {
            debug!(previous = %stale.address, "Node address changed, replaced connection");
            close_quietly(&stale).await;
        }
        Ok(client)
    }

    /// The cached connection for `node`, if it was opened against its
    /// current address.
    async fn cached(&self, node: &ReadyNode) -> Option<Arc<C::Client>> {
        self.handles
            .lock()
            .await
            .get(&node.node_id)
            .filter(|handle| handle.address == node.address)
            .map(|handle| Arc::clone(&handle.client))
    }

    /// Drop the cached connection for a node. Returns whether one existed.
    #[instrument(skip(self))]
    pub async fn remove(&self, node_id: &str) -> bool {
        self.connecting.lock().await.remove(node_id);
        let removed = self.handles.lock().await.remove(node_id);
        match removed {
            Some(handle) => {
                close_quietly(&handle).await;
                true
            }
            None => false,
        }
    }

    /// Check whether a connection is cached for a node.
    pub async fn contains(&self, node_id: &str) -> bool {
        self.handles.lock().await.contains_key(node_id)
    }

    /// Node ids with a cached connection, sorted.
    pub async fn cached_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.handles.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Invalidate every cached connection that no longer matches `members`
    /// or fails a ping.
    ///
    /// Pings run without holding the cache lock.
    #[instrument(skip(self, members), fields(members = members.len()))]
    pub async fn refresh(&self, members: &[ReadyNode]) -> RefreshReport {
        let snapshot: Vec<ClientHandle<C::Client>> =
            self.handles.lock().await.values().cloned().collect();

        let mut report = RefreshReport::default();
        for handle in snapshot {
            let current = members.iter().find(|m| m.node_id == handle.node_id);
            let valid = match current {
                Some(member) if member.address == handle.address => {
                    match handle.client.ping().await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(node_id = %handle.node_id, error = %e, "Cached client failed ping");
                            false
                        }
                    }
                }
                Some(_) => {
                    debug!(node_id = %handle.node_id, "Cached client address diverged from membership");
                    false
                }
                None => {
                    debug!(node_id = %handle.node_id, "Cached client node no longer ready");
                    false
                }
            };

            if valid {
                report.healthy.push(handle.node_id);
            } else {
                self.remove_exact(&handle).await;
                report.invalidated.push(handle.node_id);
            }
        }

        report.healthy.sort();
        report.invalidated.sort();
        if !report.invalidated.is_empty() {
            info!(invalidated = ?report.invalidated, "Invalidated cached clients");
        }
        report
    }

    /// Remove `handle` only if it is still the cached connection for its node.
    async fn remove_exact(&self, handle: &ClientHandle<C::Client>) {
        let mut handles = self.handles.lock().await;
        let same = handles
            .get(&handle.node_id)
            .is_some_and(|cached| Arc::ptr_eq(&cached.client, &handle.client));
        if !same {
            // Already replaced, and closed, by `client_for`.
            return;
        }
        handles.remove(&handle.node_id);
        drop(handles);
        close_quietly(handle).await;
    }
}

async fn close_quietly<T: NodeClient>(handle: &ClientHandle<T>) {
    if let Err(e) = handle.client.close().await {
        debug!(node_id = %handle.node_id, error = %e, "Error closing client");
    }
}
