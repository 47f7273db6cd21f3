//! The operations exposed to the orchestration layer.
//!
//! [`ClusterReconciler`] ties the store client, the slot planner and the
//! collaborator providers together. Each operation reads fresh state from
//! the providers, acts on the store, and records what it observed into the
//! persisted [`ClusterTopology`]. Operations are meant to be re-run on every
//! pass; none of them keeps state between calls apart from the connection
//! cache.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use crate::client::{
    ClientRegistry, Connector, NodeClient, RefreshReport, RetirementReport, assign_slots,
    form_mesh, retire_surplus_nodes,
};
use crate::controller::cluster_state_machine::project_status;
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::membership::{ReadyNode, nodes_by_sequence};
use crate::controller::providers::{MembershipProvider, ReplicaCountProvider, SecretProvider};
use crate::controller::rebalance::{RebalanceCoordinator, RebalanceReport};
use crate::crd::{ClusterStatus, ClusterTopology};
use crate::slots::{SlotOwnership, SlotRange, plan_slot_ranges};

/// What a scale step did.
#[derive(Debug)]
pub enum ScaleOutcome {
    /// Slots moved onto the retained nodes, surplus nodes were forgotten and
    /// the replica count was shrunk.
    ScaledDown {
        /// Rebalance onto the retained nodes.
        rebalance: RebalanceReport,
        /// Forget sweep over the surplus nodes.
        retirement: RetirementReport,
    },
    /// Every desired node is ready; the mesh was re-formed and slots were
    /// rebalanced across it.
    Rebalanced {
        /// Joins issued from the anchor.
        joined: usize,
        /// Rebalance across all nodes.
        rebalance: RebalanceReport,
    },
    /// Not all desired nodes are ready yet; only the replica count was set.
    AwaitingNodes {
        /// Desired node count.
        desired: usize,
        /// Nodes ready right now.
        ready: usize,
    },
}

/// Drives slot ownership toward the desired node count.
pub struct ClusterReconciler<C, M, R, S>
where
    C: Connector,
    M: MembershipProvider,
    R: ReplicaCountProvider,
    S: SecretProvider,
{
    ctx: Context<C>,
    membership: M,
    replicas: R,
    secret: S,
}

impl<C, M, R, S> ClusterReconciler<C, M, R, S>
where
    C: Connector,
    M: MembershipProvider,
    R: ReplicaCountProvider,
    S: SecretProvider,
{
    /// Create a reconciler.
    pub fn new(ctx: Context<C>, membership: M, replicas: R, secret: S) -> Self {
        Self {
            ctx,
            membership,
            replicas,
            secret,
        }
    }

    /// Shared context.
    pub fn context(&self) -> &Context<C> {
        &self.ctx
    }

    /// Connection cache.
    pub fn registry(&self) -> &Arc<ClientRegistry<C>> {
        &self.ctx.registry
    }

    /// Initial cluster setup: join every ready node and assign the slot plan.
    ///
    /// The plan is computed for the current ready count and written to
    /// `topology.slots` before any remote call, so a later pass can pick up
    /// where this one stopped.
    #[instrument(skip_all)]
    pub async fn configure_cluster(&self, topology: &mut ClusterTopology) -> Result<()> {
        let result = self.configure(topology).await;
        self.finish("configure_cluster", &result);
        result
    }

    async fn configure(&self, topology: &mut ClusterTopology) -> Result<()> {
        let password = self.secret.password().await?;
        let ready = self.ready_by_sequence().await?;

        let plan = plan_slot_ranges(ready.len())?;
        topology.slots = plan.clone();
        topology.record_nodes(&ready);

        form_mesh(&self.ctx.registry, &ready, password.as_deref()).await?;
        let added = assign_slots(&self.ctx.registry, &ready, &plan, password.as_deref()).await?;

        info!(
            nodes = ready.len(),
            ranges = plan.len(),
            added = added.len(),
            "Cluster configured"
        );
        Ok(())
    }

    /// One scale step.
    ///
    /// The slot plan for the desired count is persisted first. Scaling down
    /// rebalances onto the retained nodes, retires the surplus, then shrinks
    /// the replica count, in that order; any failure stops the step before
    /// the replica count changes. Once every desired node is ready the mesh
    /// is re-formed, the settle delay elapses and slots are rebalanced.
    #[instrument(skip_all)]
    pub async fn scale_cluster(&self, topology: &mut ClusterTopology) -> Result<ScaleOutcome> {
        let result = self.scale(topology).await;
        self.finish("scale_cluster", &result);
        result
    }

    async fn scale(&self, topology: &mut ClusterTopology) -> Result<ScaleOutcome> {
        let counts = self.replicas.counts().await?;
        let desired = replica_count(counts.desired)?;
        let current = replica_count(counts.current)?;

        let password = self.secret.password().await?;
        let ready = self.ready_by_sequence().await?;

        // The ready set is recorded only after this step's work succeeds.
        topology.slots = plan_slot_ranges(desired)?;

        if desired < current {
            info!(desired, current, "Scaling down");
            let rebalance = self
                .rebalance_onto(&topology.slots, &ready, password.clone())
                .await?;
            let retirement = retire_surplus_nodes(
                &self.ctx.registry,
                topology.slots.len(),
                &ready,
                password.as_deref(),
            )
            .await;
            self.ctx
                .metrics
                .record_forget_failures(retirement.failures.len() as u64);
            self.replicas.set_replicas(counts.desired).await?;
            topology.record_nodes(&ready);
            info!(
                desired,
                forgotten = retirement.forgotten.len(),
                forget_failures = retirement.failures.len(),
                "Scaled down"
            );
            return Ok(ScaleOutcome::ScaledDown {
                rebalance,
                retirement,
            });
        }

        if ready.len() == desired {
            info!(desired, "All desired nodes ready, re-forming mesh and rebalancing");
            let joined = form_mesh(&self.ctx.registry, &ready, password.as_deref()).await?;
            tokio::time::sleep(self.ctx.config.settle_delay).await;
            let rebalance = self
                .rebalance_onto(&topology.slots, &ready, password)
                .await?;
            if counts.current != counts.desired {
                self.replicas.set_replicas(counts.desired).await?;
            }
            topology.record_nodes(&ready);
            return Ok(ScaleOutcome::Rebalanced { joined, rebalance });
        }

        if counts.current != counts.desired {
            info!(desired, current, "Raising replica count");
            self.replicas.set_replicas(counts.desired).await?;
        }
        topology.record_nodes(&ready);
        debug!(desired, ready = ready.len(), "Waiting for nodes to become ready");
        Ok(ScaleOutcome::AwaitingNodes {
            desired,
            ready: ready.len(),
        })
    }

    /// Move every misplaced slot to the owner the persisted plan assigns it.
    ///
    /// Ownership is observed fresh from the first node. Fails if any
    /// migration failed; every planned migration is still attempted.
    #[instrument(skip_all, fields(ranges = topology.slots.len()))]
    pub async fn rebalance_cluster(&self, topology: &ClusterTopology) -> Result<RebalanceReport> {
        let result = self.rebalance(topology).await;
        self.finish("rebalance_cluster", &result);
        result
    }

    async fn rebalance(&self, topology: &ClusterTopology) -> Result<RebalanceReport> {
        if topology.slots.is_empty() {
            return Err(Error::Topology("no slot plan has been persisted".to_string()));
        }
        let password = self.secret.password().await?;
        let ready = self.ready_by_sequence().await?;
        self.rebalance_onto(&topology.slots, &ready, password).await
    }

    /// Project the scaling status from the replica counts and the ready
    /// count recorded in `topology`, and store it there.
    #[instrument(skip_all, fields(prior = %topology.status))]
    pub async fn update_scaling_status(&self, topology: &mut ClusterTopology) -> Result<ClusterStatus> {
        let result = self.update_status(topology).await;
        self.finish("update_scaling_status", &result);
        result
    }

    async fn update_status(&self, topology: &mut ClusterTopology) -> Result<ClusterStatus> {
        let counts = self.replicas.counts().await?;
        let ready = i32::try_from(topology.observed_ready()).unwrap_or(i32::MAX);
        let next = project_status(topology.status, counts.desired, counts.current, ready);

        if next != topology.status {
            info!(from = %topology.status, to = %next, "Cluster status changed");
        }
        topology.status = next;
        self.ctx.metrics.set_status(next);
        Ok(next)
    }

    /// Drop cached connections that no longer match the ready set or fail
    /// a ping.
    #[instrument(skip_all)]
    pub async fn refresh_clients(&self) -> Result<RefreshReport> {
        let result = match self.membership.ready_nodes().await {
            Ok(nodes) => Ok(self.ctx.registry.refresh(&nodes).await),
            Err(e) => Err(e),
        };
        self.finish("refresh_clients", &result);
        result
    }

    /// Ready nodes ordered by sequence index.
    async fn ready_by_sequence(&self) -> Result<Vec<ReadyNode>> {
        let nodes = self.membership.ready_nodes().await?;
        nodes_by_sequence(&nodes, |name| self.membership.sequence_of(name))
    }

    /// Slot ownership as the first node in sequence order sees it.
    async fn observe_ownership(
        &self,
        nodes_by_sequence: &[ReadyNode],
        password: Option<&str>,
    ) -> Result<Vec<SlotOwnership>> {
        let Some(first) = nodes_by_sequence.first() else {
            return Err(Error::Topology("no ready nodes to observe".to_string()));
        };
        let client = self.ctx.registry.client_for(first, password).await?;
        Ok(client.slot_ownership().await?)
    }

    async fn rebalance_onto(
        &self,
        target: &[SlotRange],
        nodes_by_sequence: &[ReadyNode],
        password: Option<String>,
    ) -> Result<RebalanceReport> {
        let observed = self
            .observe_ownership(nodes_by_sequence, password.as_deref())
            .await?;

        let config = &self.ctx.config;
        let coordinator = RebalanceCoordinator::new(
            Arc::clone(&self.ctx.registry),
            config.concurrent_migrations,
            config.routing,
            config.migration_options(password),
        )?;

        let started = Instant::now();
        let report = coordinator.run(&observed, target, nodes_by_sequence).await?;
        self.ctx.metrics.record_migrations(
            report.completed(),
            report.failed(),
            report.keys_migrated(),
            report.keys_purged(),
        );
        self.ctx
            .metrics
            .observe_rebalance(started.elapsed().as_secs_f64());

        if report.has_errors() {
            warn!(
                failed = report.failed(),
                attempted = report.attempted(),
                "Rebalance finished with failed migrations"
            );
        }
        report.into_result()
    }

    fn finish<T>(&self, operation: &str, result: &Result<T>) {
        self.ctx.metrics.record_operation(operation, result.is_ok());
        if let Err(e) = result {
            error!(operation, error = %e, retryable = e.is_retryable(), "Operation failed");
        }
    }
}

/// Convert a replica count to a node count, rejecting negatives.
fn replica_count(replicas: i32) -> Result<usize> {
    usize::try_from(replicas)
        .map_err(|_| Error::Configuration(format!("replica count {} is negative", replicas)))
}
