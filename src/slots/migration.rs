//! Slot migration state machine.
//!
//! This module models the Valkey slot migration protocol:
//! 1. SETSLOT IMPORTING on the destination
//! 2. SETSLOT MIGRATING on the source
//! 3. Drain keys in batches (MIGRATE each key, or DEL them in purge mode)
//! 4. SETSLOT NODE on the source, then on the destination
//!
//! The tracker records how far a single migration got, so a failure can be
//! reported together with the step it happened in.

use super::planner::SlotMigration;

/// State of a single slot migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MigrationState {
    /// Migration not started.
    #[default]
    Pending,
    /// Destination node is importing (SETSLOT IMPORTING sent).
    Importing,
    /// Source node is migrating (SETSLOT MIGRATING sent).
    Migrating,
    /// Keys are being drained from the source.
    DrainingKeys {
        /// Number of batches processed so far.
        batches: u64,
    },
    /// Keys drained, ownership being handed over.
    Finalizing,
    /// Migration complete.
    Complete,
    /// Migration failed.
    Failed {
        /// Error description.
        error: String,
    },
}

impl MigrationState {
    /// Check if this state indicates the migration is done.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationState::Complete | MigrationState::Failed { .. }
        )
    }

    /// Check if the migration completed successfully.
    pub fn is_complete(&self) -> bool {
        matches!(self, MigrationState::Complete)
    }

    /// Check if the migration failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, MigrationState::Failed { .. })
    }

    /// Check if the migration is in progress.
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal() && !matches!(self, MigrationState::Pending)
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationState::Pending => write!(f, "pending"),
            MigrationState::Importing => write!(f, "importing"),
            MigrationState::Migrating => write!(f, "migrating"),
            MigrationState::DrainingKeys { batches } => {
                write!(f, "draining keys (batch {})", batches)
            }
            MigrationState::Finalizing => write!(f, "finalizing"),
            MigrationState::Complete => write!(f, "complete"),
            MigrationState::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Tracks the state of a slot migration.
#[derive(Debug, Clone)]
pub struct SlotMigrationTracker {
    /// The migration being executed.
    pub migration: SlotMigration,
    /// Current state of the migration.
    pub state: MigrationState,
    /// Keys transferred to the destination.
    pub keys_migrated: u64,
    /// Keys deleted from the source without transfer.
    pub keys_purged: u64,
}

impl SlotMigrationTracker {
    /// Create a new migration tracker.
    pub fn new(migration: SlotMigration) -> Self {
        Self {
            migration,
            state: MigrationState::Pending,
            keys_migrated: 0,
            keys_purged: 0,
        }
    }

    /// The slot being migrated.
    pub fn slot(&self) -> u16 {
        self.migration.slot
    }

    /// Transition to the next state.
    pub fn advance(&mut self, next: MigrationState) {
        self.state = next;
    }

    /// Record that another batch of keys is being processed.
    pub fn next_batch(&mut self) {
        let batches = match self.state {
            MigrationState::DrainingKeys { batches } => batches + 1,
            _ => 1,
        };
        self.state = MigrationState::DrainingKeys { batches };
    }

    /// Record keys as migrated.
    pub fn record_keys_migrated(&mut self, count: u64) {
        self.keys_migrated += count;
    }

    /// Record keys as purged.
    pub fn record_keys_purged(&mut self, count: u64) {
        self.keys_purged += count;
    }

    /// Mark as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = MigrationState::Failed {
            error: error.into(),
        };
    }

    /// Mark as complete.
    pub fn complete(&mut self) {
        self.state = MigrationState::Complete;
    }

    /// Check if the migration is done.
    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    /// Check if the migration completed successfully.
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Check if the migration failed.
    pub fn is_failed(&self) -> bool {
        self.state.is_failed()
    }
}
