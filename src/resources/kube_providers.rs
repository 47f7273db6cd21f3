//! Kubernetes-backed collaborators.
//!
//! - [`PodMembership`]: ready node pods, identified through `CLUSTER MYID`
//! - [`StatefulSetReplicas`]: desired count from the `RedisCluster`, current
//!   count from the StatefulSet running its pods
//! - [`SecretPassword`]: the store password from a Secret

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use tracing::{debug, instrument, warn};

use super::common::{FIELD_MANAGER, pod_selector};
use crate::client::{Connector, NodeClient};
use crate::controller::error::{Error, Result};
use crate::controller::membership::ReadyNode;
use crate::controller::providers::{
    MembershipProvider, ReplicaCountProvider, ReplicaCounts, SecretProvider,
};
use crate::crd::RedisCluster;

/// Secret key holding the store password.
pub const PASSWORD_KEY: &str = "requirepass";

/// Check whether a pod has condition `Ready=True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Name and IP of a ready pod. `None` if the pod is not ready or has no IP yet.
pub fn ready_pod_address(pod: &Pod) -> Option<(String, String)> {
    if !is_pod_ready(pod) {
        return None;
    }
    let name = pod.metadata.name.clone()?;
    let ip = pod.status.as_ref()?.pod_ip.clone()?;
    Some((name, ip))
}

/// Read the password out of a Secret.
pub fn password_from_secret(secret: &Secret, key: &str) -> Result<String> {
    let name = secret.metadata.name.as_deref().unwrap_or_default();
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| {
            Error::Configuration(format!("secret {} has no key {}", name, key))
        })?;
    String::from_utf8(bytes.0.clone()).map_err(|e| {
        Error::Configuration(format!("secret {} key {} is not UTF-8: {}", name, key, e))
    })
}

/// Store password from the Secret named in `spec.auth.secretName`.
#[derive(Clone)]
pub struct SecretPassword {
    secrets: Api<Secret>,
    secret_name: String,
}

impl SecretPassword {
    /// Password provider for `secret_name` in `namespace`. An empty name
    /// means the store is unauthenticated.
    pub fn new(client: Client, namespace: &str, secret_name: impl Into<String>) -> Self {
        Self {
            secrets: Api::namespaced(client, namespace),
            secret_name: secret_name.into(),
        }
    }
}

impl SecretProvider for SecretPassword {
    #[instrument(skip(self), fields(secret = %self.secret_name))]
    async fn password(&self) -> Result<Option<String>> {
        if self.secret_name.is_empty() {
            return Ok(None);
        }
        match self.secrets.get(&self.secret_name).await {
            Ok(secret) => password_from_secret(&secret, PASSWORD_KEY).map(Some),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                warn!("Auth secret not found");
                Err(Error::Configuration(format!(
                    "auth secret {} not found",
                    self.secret_name
                )))
            }
            Err(e) => Err(Error::Kube(e)),
        }
    }
}

/// Ready node pods of one cluster.
///
/// Each ready pod is asked for its cluster identity over a short-lived
/// connection that is not cached.
pub struct PodMembership<C: Connector> {
    pods: Api<Pod>,
    selector: String,
    connector: C,
    port: u16,
    secret: SecretPassword,
}

impl<C: Connector> PodMembership<C> {
    /// Membership of the cluster `cluster_name` in `namespace`.
    pub fn new(
        client: Client,
        namespace: &str,
        cluster_name: &str,
        connector: C,
        port: u16,
        secret: SecretPassword,
    ) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            selector: pod_selector(cluster_name),
            connector,
            port,
            secret,
        }
    }
}

impl<C: Connector> MembershipProvider for PodMembership<C> {
    #[instrument(skip(self), fields(selector = %self.selector))]
    async fn ready_nodes(&self) -> Result<Vec<ReadyNode>> {
        let password = self.secret.password().await?;
        let pods = self
            .pods
            .list(&ListParams::default().labels(&self.selector))
            .await?;

        let mut nodes = Vec::new();
        for (name, ip) in pods.items.iter().filter_map(ready_pod_address) {
            let client = self
                .connector
                .connect(&ip, self.port, password.as_deref())
                .await?;
            let identity = client.my_id().await;
            if let Err(e) = client.close().await {
                debug!(pod = %name, error = %e, "Failed to close identity connection");
            }
            let node_id = identity?;
            nodes.push(ReadyNode::new(node_id, name, ip));
        }
        debug!(ready = nodes.len(), total = pods.items.len(), "Listed ready nodes");
        Ok(nodes)
    }
}

/// Replica counts of one cluster.
///
/// The StatefulSet is expected to share the cluster's name.
pub struct StatefulSetReplicas {
    clusters: Api<RedisCluster>,
    statefulsets: Api<StatefulSet>,
    name: String,
}

impl StatefulSetReplicas {
    /// Replica provider for `name` in `namespace`.
    pub fn new(client: Client, namespace: &str, name: impl Into<String>) -> Self {
        Self {
            clusters: Api::namespaced(client.clone(), namespace),
            statefulsets: Api::namespaced(client, namespace),
            name: name.into(),
        }
    }
}

impl ReplicaCountProvider for StatefulSetReplicas {
    #[instrument(skip(self), fields(name = %self.name))]
    async fn counts(&self) -> Result<ReplicaCounts> {
        let cluster = self.clusters.get(&self.name).await?;
        let statefulset = self.statefulsets.get(&self.name).await?;
        // An unset StatefulSet replica count defaults to 1.
        let current = statefulset
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        Ok(ReplicaCounts {
            desired: cluster.spec.replicas,
            current,
        })
    }

    #[instrument(skip(self), fields(name = %self.name))]
    async fn set_replicas(&self, replicas: i32) -> Result<()> {
        if replicas < 0 {
            return Err(Error::Configuration(format!(
                "replica count {} is negative",
                replicas
            )));
        }
        let patch = serde_json::json!({
            "spec": {
                "replicas": replicas
            }
        });
        self.statefulsets
            .patch(
                &self.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        debug!(replicas, "StatefulSet replicas updated");
        Ok(())
    }
}
