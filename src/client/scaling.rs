//! The per-slot migration protocol.
//!
//! Moving one slot between two nodes:
//! 1. SETSLOT IMPORTING on the destination, SETSLOT MIGRATING on the source
//! 2. Drain keys from the source in batches, either transferring each key
//!    with MIGRATE or deleting them outright in purge mode
//! 3. SETSLOT NODE on the source, then on the destination
//!
//! Nothing here is rolled back. A failure leaves the slot in its
//! importing/migrating state and the next reconciliation pass picks it up.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::protocol::{Connector, MigrateTarget, NodeClient, SetSlotState};
use super::registry::ClientRegistry;
use super::valkey_client::ValkeyError;
use crate::controller::error::{Error, Result};
use crate::controller::membership::{ReadyNode, find_node};
use crate::slots::{MigrationState, SlotMigrationTracker};

/// Client-side slack on top of the server-side MIGRATE timeout.
const KEY_TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Settings shared by every migration of a rebalance pass.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Delete keys instead of transferring them.
    pub purge: bool,
    /// Keys fetched per batch.
    pub batch_size: u64,
    /// Per-key transfer timeout.
    pub key_timeout: Duration,
    /// Store port on the destination.
    pub port: u16,
    /// Store credential.
    pub password: Option<String>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            purge: false,
            batch_size: 100,
            key_timeout: Duration::from_secs(1),
            port: 6379,
            password: None,
        }
    }
}

/// Move one slot from its source to its destination.
///
/// The tracker records how far the migration got; on error it is marked
/// failed with the error message before the error is returned.
#[instrument(
    skip_all,
    fields(
        slot = tracker.migration.slot,
        source = %tracker.migration.source,
        destination = %tracker.migration.destination
    )
)]
pub async fn migrate_slot<C: Connector>(
    registry: &ClientRegistry<C>,
    nodes: &[ReadyNode],
    tracker: &mut SlotMigrationTracker,
    options: &MigrationOptions,
) -> Result<()> {
    let result = run_migration(registry, nodes, tracker, options).await;
    match &result {
        Ok(()) => tracker.complete(),
        Err(e) => {
            warn!(state = %tracker.state, error = %e, "Slot migration failed");
            tracker.fail(e.to_string());
        }
    }
    result
}

async fn run_migration<C: Connector>(
    registry: &ClientRegistry<C>,
    nodes: &[ReadyNode],
    tracker: &mut SlotMigrationTracker,
    options: &MigrationOptions,
) -> Result<()> {
    let migration = tracker.migration.clone();
    let slot = migration.slot;

    let source = find_node(nodes, &migration.source).ok_or_else(|| {
        Error::Topology(format!(
            "source node {} of slot {} is not ready",
            migration.source, slot
        ))
    })?;
    let destination = find_node(nodes, &migration.destination).ok_or_else(|| {
        Error::Topology(format!(
            "destination node {} of slot {} is not ready",
            migration.destination, slot
        ))
    })?;

    let password = options.password.as_deref();
    let dst_client = registry.client_for(destination, password).await?;
    let src_client = registry.client_for(source, password).await?;

    dst_client
        .set_slot(slot, SetSlotState::Importing(source.node_id.clone()))
        .await?;
    tracker.advance(MigrationState::Importing);
    src_client
        .set_slot(slot, SetSlotState::Migrating(destination.node_id.clone()))
        .await?;
    tracker.advance(MigrationState::Migrating);

    let target = MigrateTarget {
        host: destination.address.clone(),
        port: options.port,
        timeout: options.key_timeout,
        password: options.password.clone(),
    };
    let batch_size = options.batch_size.max(1);

    loop {
        let keys = src_client.keys_in_slot(slot, batch_size).await?;
        if keys.is_empty() {
            break;
        }
        tracker.next_batch();

        if options.purge {
            let removed = src_client.delete_keys(&keys).await?;
            tracker.record_keys_purged(removed);
            debug!(slot, removed, "Purged keys");
        } else {
            for key in &keys {
                transfer_key(src_client.as_ref(), &target, key).await?;
                tracker.record_keys_migrated(1);
            }
            debug!(slot, moved = keys.len(), "Migrated keys");
        }

        if (keys.len() as u64) < batch_size {
            break;
        }
    }

    tracker.advance(MigrationState::Finalizing);
    src_client
        .set_slot(slot, SetSlotState::Node(destination.node_id.clone()))
        .await?;
    dst_client
        .set_slot(slot, SetSlotState::Node(destination.node_id.clone()))
        .await?;

    debug!(
        slot,
        keys_migrated = tracker.keys_migrated,
        keys_purged = tracker.keys_purged,
        "Slot migrated"
    );
    Ok(())
}

async fn transfer_key<T: NodeClient>(
    client: &T,
    target: &MigrateTarget,
    key: &str,
) -> std::result::Result<(), ValkeyError> {
    let limit = target.timeout + KEY_TIMEOUT_GRACE;
    match tokio::time::timeout(limit, client.migrate_key(target, key)).await {
        Ok(result) => result,
        Err(_) => Err(ValkeyError::Timeout {
            operation: format!("MIGRATE {}", key),
            duration: limit,
        }),
    }
}
