//! Rebalance coordination across a pool of migration workers.
//!
//! The coordinator diffs observed slot ownership against the target plan,
//! then fans the resulting migrations out over `C` workers. Each worker owns
//! one queue and runs its migrations strictly in order; migrations are
//! independent of each other, so which worker gets which slot does not
//! matter. Every queued migration is attempted even after another one fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientRegistry, Connector, MigrationOptions, migrate_slot};
use crate::controller::context::WorkRouting;
use crate::controller::error::{Error, Result};
use crate::controller::membership::{ReadyNode, sequence_ids};
use crate::slots::{SlotMigration, SlotMigrationTracker, SlotOwnership, SlotRange, plan_migrations};

/// Capacity of each worker's queue.
const WORKER_QUEUE_CAPACITY: usize = 256;

/// Aggregated outcome of one worker.
#[derive(Debug)]
pub struct MigrationResult {
    /// Worker index.
    pub worker: usize,
    /// Migrations taken off the queue.
    pub attempted: u64,
    /// Migrations that finished.
    pub completed: u64,
    /// Keys transferred by this worker.
    pub keys_migrated: u64,
    /// Keys purged by this worker.
    pub keys_purged: u64,
    /// Slots whose migration finished.
    pub migrated_slots: Vec<u16>,
    /// Last error seen, if any.
    pub last_error: Option<Error>,
}

impl MigrationResult {
    fn new(worker: usize) -> Self {
        Self {
            worker,
            attempted: 0,
            completed: 0,
            keys_migrated: 0,
            keys_purged: 0,
            migrated_slots: Vec::new(),
            last_error: None,
        }
    }

    /// Migrations that failed.
    pub fn failed(&self) -> u64 {
        self.attempted - self.completed
    }
}

/// Outcome of a rebalance pass.
#[derive(Debug, Default)]
pub struct RebalanceReport {
    /// Migrations the diff produced.
    pub planned: usize,
    /// Per-worker results, ordered by worker index.
    pub results: Vec<MigrationResult>,
    /// Wall time of the pass.
    pub duration: Duration,
}

impl RebalanceReport {
    /// Migrations attempted across all workers.
    pub fn attempted(&self) -> u64 {
        self.results.iter().map(|r| r.attempted).sum()
    }

    /// Migrations completed across all workers.
    pub fn completed(&self) -> u64 {
        self.results.iter().map(|r| r.completed).sum()
    }

    /// Migrations failed across all workers.
    pub fn failed(&self) -> u64 {
        self.results.iter().map(MigrationResult::failed).sum()
    }

    /// Keys transferred across all workers.
    pub fn keys_migrated(&self) -> u64 {
        self.results.iter().map(|r| r.keys_migrated).sum()
    }

    /// Keys purged across all workers.
    pub fn keys_purged(&self) -> u64 {
        self.results.iter().map(|r| r.keys_purged).sum()
    }

    /// Slots whose migration finished, sorted.
    pub fn migrated_slots(&self) -> Vec<u16> {
        let mut slots: Vec<u16> = self
            .results
            .iter()
            .flat_map(|r| r.migrated_slots.iter().copied())
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Check whether any worker reported an error.
    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|r| r.last_error.is_some())
    }

    /// Turn the report into an error if any worker failed.
    ///
    /// With several failing workers the one with the highest index wins.
    pub fn into_result(mut self) -> Result<Self> {
        let last = self
            .results
            .iter_mut()
            .rev()
            .find_map(|r| r.last_error.take());
        match last {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// Picks the worker for each migration.
enum Router {
    Random { rng: StdRng, workers: usize },
    RoundRobin { next: usize, workers: usize },
}

impl Router {
    fn new(routing: WorkRouting, workers: usize) -> Self {
        match routing {
            WorkRouting::Random => Router::Random {
                rng: StdRng::from_entropy(),
                workers,
            },
            WorkRouting::RoundRobin => Router::RoundRobin { next: 0, workers },
        }
    }

    fn pick(&mut self) -> usize {
        match self {
            Router::Random { rng, workers } => rng.gen_range(0..*workers),
            Router::RoundRobin { next, workers } => {
                let chosen = *next;
                *next = (*next + 1) % *workers;
                chosen
            }
        }
    }
}

/// Moves slot ownership toward a target plan using a worker pool.
pub struct RebalanceCoordinator<C: Connector> {
    registry: Arc<ClientRegistry<C>>,
    workers: usize,
    routing: WorkRouting,
    options: Arc<MigrationOptions>,
}

impl<C: Connector> RebalanceCoordinator<C> {
    /// Create a coordinator. Fails if `workers` is 0.
    pub fn new(
        registry: Arc<ClientRegistry<C>>,
        workers: usize,
        routing: WorkRouting,
        options: MigrationOptions,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Configuration(
                "concurrent migrations must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            registry,
            workers,
            routing,
            options: Arc::new(options),
        })
    }

    /// Run one rebalance pass.
    ///
    /// `nodes_by_sequence` is the ready node set ordered by sequence index.
    /// Fails before any migration starts when there are fewer ready nodes
    /// than target ranges or a desired owner cannot be resolved. Otherwise
    /// every planned migration is attempted and the per-worker results are
    /// returned; use [`RebalanceReport::into_result`] to surface failures.
    #[instrument(skip_all, fields(workers = self.workers, ranges = target.len(), nodes = nodes_by_sequence.len()))]
    pub async fn run(
        &self,
        observed: &[SlotOwnership],
        target: &[SlotRange],
        nodes_by_sequence: &[ReadyNode],
    ) -> Result<RebalanceReport> {
        let started = Instant::now();

        if nodes_by_sequence.len() < target.len() {
            return Err(Error::Topology(format!(
                "got {} ready nodes but the slot plan needs {}",
                nodes_by_sequence.len(),
                target.len()
            )));
        }

        let migrations = plan_migrations(observed, target, &sequence_ids(nodes_by_sequence))?;
        let planned = migrations.len();
        info!(planned, "Starting rebalance");

        let nodes = Arc::new(nodes_by_sequence.to_vec());
        let (senders, handles): (Vec<_>, Vec<_>) = (0..self.workers)
            .map(|worker| {
                let (tx, rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);
                let handle = spawn_worker(
                    worker,
                    rx,
                    Arc::clone(&self.registry),
                    Arc::clone(&nodes),
                    Arc::clone(&self.options),
                );
                (tx, handle)
            })
            .unzip();

        let mut router = Router::new(self.routing, self.workers);
        let mut undelivered = 0u64;
        for migration in migrations {
            let worker = router.pick();
            let Some(tx) = senders.get(worker) else {
                undelivered += 1;
                continue;
            };
            if tx.send(migration).await.is_err() {
                undelivered += 1;
            }
        }
        // Closing the queues lets each worker drain and report.
        drop(senders);

        let mut results = Vec::with_capacity(self.workers);
        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(worker, error = %e, "Migration worker stopped");
                    let mut result = MigrationResult::new(worker);
                    result.last_error = Some(Error::Worker(format!("worker {}: {}", worker, e)));
                    results.push(result);
                }
            }
        }

        if undelivered > 0
            && let Some(result) = results.last_mut()
            && result.last_error.is_none()
        {
            result.last_error = Some(Error::Worker(format!(
                "{} migrations could not be queued",
                undelivered
            )));
        }

        let report = RebalanceReport {
            planned,
            results,
            duration: started.elapsed(),
        };
        info!(
            planned,
            completed = report.completed(),
            failed = report.failed(),
            "Rebalance finished"
        );
        Ok(report)
    }
}

fn spawn_worker<C: Connector>(
    worker: usize,
    mut rx: mpsc::Receiver<SlotMigration>,
    registry: Arc<ClientRegistry<C>>,
    nodes: Arc<Vec<ReadyNode>>,
    options: Arc<MigrationOptions>,
) -> JoinHandle<MigrationResult> {
    tokio::spawn(async move {
        let mut result = MigrationResult::new(worker);
        while let Some(migration) = rx.recv().await {
            result.attempted += 1;
            let slot = migration.slot;
            let mut tracker = SlotMigrationTracker::new(migration);
            match migrate_slot(&registry, &nodes, &mut tracker, &options).await {
                Ok(()) => {
                    result.completed += 1;
                    result.migrated_slots.push(slot);
                }
                Err(e) => {
                    debug!(worker, slot, error = %e, "Migration failed, continuing with queue");
                    result.last_error = Some(e);
                }
            }
            result.keys_migrated += tracker.keys_migrated;
            result.keys_purged += tracker.keys_purged;
        }
        result
    })
}
