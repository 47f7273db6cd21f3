//! Prometheus metrics for slot reconciliation.
//!
//! The registry is owned by [`Metrics`]; embedding binaries expose
//! [`Metrics::encode`] on whatever endpoint they serve.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::crd::ClusterStatus;

/// Labels for per-operation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OperationLabels {
    pub operation: String,
}

impl EncodeLabelSet for OperationLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for slot migration outcomes
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabels {
    pub outcome: String,
}

impl EncodeLabelSet for OutcomeLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for the status gauge
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct StatusLabels {
    pub status: String,
}

impl EncodeLabelSet for StatusLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("status", self.status.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the reconciler
pub struct Metrics {
    /// Exposed operations run
    pub operations_total: Family<OperationLabels, Counter>,
    /// Exposed operations that returned an error
    pub operation_errors_total: Family<OperationLabels, Counter>,
    /// Slot migrations by outcome
    pub slot_migrations_total: Family<OutcomeLabels, Counter>,
    /// Keys transferred to a new owner
    pub keys_migrated_total: Counter,
    /// Keys deleted in purge mode
    pub keys_purged_total: Counter,
    /// Failed forget attempts during retirement
    pub forget_failures_total: Counter,
    /// Rebalance duration
    pub rebalance_duration_seconds: Histogram,
    /// 1 for the current cluster status, 0 otherwise
    pub cluster_status: Family<StatusLabels, Gauge>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let operations_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "slot_reconciler_operations",
            "Total number of reconciler operations",
            operations_total.clone(),
        );

        let operation_errors_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "slot_reconciler_operation_errors",
            "Total number of failed reconciler operations",
            operation_errors_total.clone(),
        );

        let slot_migrations_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "slot_reconciler_slot_migrations",
            "Slot migrations by outcome",
            slot_migrations_total.clone(),
        );

        let keys_migrated_total = Counter::default();
        registry.register(
            "slot_reconciler_keys_migrated",
            "Keys transferred during slot migration",
            keys_migrated_total.clone(),
        );

        let keys_purged_total = Counter::default();
        registry.register(
            "slot_reconciler_keys_purged",
            "Keys deleted during slot migration in purge mode",
            keys_purged_total.clone(),
        );

        let forget_failures_total = Counter::default();
        registry.register(
            "slot_reconciler_forget_failures",
            "Failed CLUSTER FORGET attempts during node retirement",
            forget_failures_total.clone(),
        );

        let rebalance_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 16));
        registry.register(
            "slot_reconciler_rebalance_duration_seconds",
            "Duration of a rebalance in seconds",
            rebalance_duration_seconds.clone(),
        );

        let cluster_status = Family::<StatusLabels, Gauge>::default();
        registry.register(
            "slot_reconciler_cluster_status",
            "Current cluster scaling status",
            cluster_status.clone(),
        );

        Self {
            operations_total,
            operation_errors_total,
            slot_migrations_total,
            keys_migrated_total,
            keys_purged_total,
            forget_failures_total,
            rebalance_duration_seconds,
            cluster_status,
            registry,
        }
    }

    /// Record the outcome of an exposed operation
    pub fn record_operation(&self, operation: &str, success: bool) {
        let labels = OperationLabels {
            operation: operation.to_string(),
        };
        self.operations_total.get_or_create(&labels).inc();
        if !success {
            self.operation_errors_total.get_or_create(&labels).inc();
        }
    }

    /// Record slot migration outcomes and key counts
    pub fn record_migrations(&self, completed: u64, failed: u64, keys_migrated: u64, keys_purged: u64) {
        let label = |outcome: &str| OutcomeLabels {
            outcome: outcome.to_string(),
        };
        self.slot_migrations_total
            .get_or_create(&label("completed"))
            .inc_by(completed);
        self.slot_migrations_total
            .get_or_create(&label("failed"))
            .inc_by(failed);
        self.keys_migrated_total.inc_by(keys_migrated);
        self.keys_purged_total.inc_by(keys_purged);
    }

    /// Record a rebalance duration
    pub fn observe_rebalance(&self, duration_secs: f64) {
        self.rebalance_duration_seconds.observe(duration_secs);
    }

    /// Record failed forget attempts
    pub fn record_forget_failures(&self, count: u64) {
        self.forget_failures_total.inc_by(count);
    }

    /// Set the status gauge
    pub fn set_status(&self, status: ClusterStatus) {
        for candidate in [
            ClusterStatus::Ready,
            ClusterStatus::ScalingUp,
            ClusterStatus::ScalingDown,
        ] {
            let labels = StatusLabels {
                status: candidate.to_string(),
            };
            self.cluster_status
                .get_or_create(&labels)
                .set(i64::from(candidate == status));
        }
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}
