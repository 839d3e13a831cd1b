//! cairn-sim library.
//!
//! Deterministic simulation harness for the coordination protocol: a pool
//! of simulated workers races over a shared in-memory tracker while faults
//! (quota windows, rival claim writes, corrupted checkpoints) are injected
//! from a seeded RNG. After the run an oracle replays every item's log and
//! checks the protocol invariants.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` at the harness boundary.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod campaign;
pub mod faults;
pub mod oracle;
pub mod rng;
pub mod worker;

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cairn_core::error::CoordError;
use cairn_core::model::item::{ItemId, Label, WorkItem};
use cairn_core::store::MemStore;

use crate::faults::{FaultConfig, FaultStats, FaultStore};
use crate::oracle::OracleResult;
use crate::rng::DeterministicRng;
use crate::worker::{SimWorker, WorkerStats};

/// Parameters for a single simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for every random decision in the run.
    pub seed: u64,
    /// Number of racing workers.
    pub worker_count: usize,
    /// Number of work items seeded into the tracker.
    pub item_count: usize,
    /// Ticks per worker.
    pub rounds: u64,
    /// Fault injection rates.
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            worker_count: 4,
            item_count: 8,
            rounds: 64,
            fault: FaultConfig::default(),
        }
    }
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    /// Rounds actually executed.
    pub rounds_run: u64,
    /// Aggregated worker counters.
    pub stats: WorkerStats,
    /// Fault injection counters.
    pub faults: FaultStats,
    /// Ticks skipped because a quota window aborted them.
    pub quota_skips: u64,
    /// Invariant check outcome over the final store state.
    pub oracle: OracleResult,
    /// Whether the run exercised at least one fault or race path.
    pub interesting_state_reached: bool,
}

/// One seeded run: seeded store, worker pool, fault layer, oracle.
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    backing: MemStore,
    store: FaultStore,
    workers: Vec<SimWorker>,
    hub: ItemId,
}

impl Simulator {
    /// Build a simulator, seeding the tracker with the hub and work items.
    ///
    /// # Errors
    ///
    /// Invalid configuration (no workers, no items, no rounds).
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.worker_count == 0 {
            bail!("worker_count must be > 0");
        }
        if config.item_count == 0 {
            bail!("item_count must be > 0");
        }
        if config.rounds == 0 {
            bail!("rounds must be > 0");
        }

        let backing = MemStore::new();
        let hub = ItemId::new_unchecked("epic-hub");
        backing.insert_item(WorkItem {
            id: hub.clone(),
            title: "simulated epic".to_string(),
            body: String::new(),
            assignee: None,
            labels: BTreeSet::new(),
            closed: false,
        });
        for n in 1..=config.item_count {
            backing.insert_item(WorkItem {
                id: ItemId::new_unchecked(format!("item-{n}")),
                title: format!("simulated task {n}"),
                body: String::new(),
                assignee: None,
                labels: [Label::Ready].into_iter().collect::<BTreeSet<_>>(),
                closed: false,
            });
        }

        // Independent RNG streams for scheduling and for the fault layer,
        // both derived from the seed.
        let rng = DeterministicRng::new(config.seed);
        let fault_rng = DeterministicRng::new(config.seed.wrapping_add(1));
        let store = FaultStore::new(backing.clone(), config.fault, fault_rng);
        let workers = (0..config.worker_count).map(SimWorker::new).collect();

        Ok(Self {
            config,
            rng,
            backing,
            store,
            workers,
            hub,
        })
    }

    /// Execute the run and check the invariants.
    ///
    /// # Errors
    ///
    /// Unexpected store failures. Quota windows are absorbed as skipped
    /// ticks, not errors.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let mut quota_skips = 0_u64;
        for round in 0..self.config.rounds {
            if self.rng.chance(self.config.fault.quota_fault_percent) {
                self.backing.inject_quota_faults(
                    1,
                    Duration::from_secs(self.config.fault.quota_reset_secs),
                );
            }
            for worker in &mut self.workers {
                match worker.tick(&self.store, &self.hub, &mut self.rng) {
                    Ok(()) => {}
                    Err(CoordError::QuotaExhausted { .. }) => {
                        quota_skips += 1;
                        debug!(round, worker = %worker.id(), "tick aborted by quota window");
                    }
                    Err(err) => bail!("worker {} failed at round {round}: {err}", worker.id()),
                }
            }
        }

        let mut stats = WorkerStats::default();
        for worker in &self.workers {
            stats.absorb(worker.stats);
        }
        let faults = self.store.stats();
        let oracle = oracle::check_all(&self.store)
            .map_err(|err| anyhow::anyhow!("oracle store failure: {err}"))?;
        let interesting_state_reached = stats.races_lost > 0
            || stats.lock_waits > 0
            || quota_skips > 0
            || faults.rival_claims > 0
            || faults.malformed_snapshots > 0;

        Ok(SimulationResult {
            rounds_run: self.config.rounds,
            stats,
            faults,
            quota_skips,
            oracle,
            interesting_state_reached,
        })
    }
}
