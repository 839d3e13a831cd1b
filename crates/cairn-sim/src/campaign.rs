//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds, collecting pass/fail results and identifying the
//! first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::faults::FaultConfig;
use crate::oracle::format_violation;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds to run and the per-seed
/// simulation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    /// Racing workers per seed.
    pub worker_count: usize,
    /// Work items per seed.
    pub item_count: usize,
    /// Ticks per worker per seed.
    pub rounds: u64,
    /// Fault injection rates applied to every seed.
    pub fault: FaultConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            worker_count: 4,
            item_count: 8,
            rounds: 64,
            fault: FaultConfig::default(),
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            worker_count: self.worker_count,
            item_count: self.item_count,
            rounds: self.rounds,
            fault: self.fault,
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Any parameter out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.worker_count == 0 {
            bail!("worker_count must be > 0");
        }
        if self.item_count == 0 {
            bail!("item_count must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        Ok(())
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    /// The seed that failed.
    pub seed: u64,
    /// Invariant violations found, rendered for the report.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Total seeds executed.
    pub seeds_run: usize,
    /// Seeds that passed all invariants.
    pub seeds_passed: usize,
    /// First seed that failed, for prioritized replay.
    pub first_failure: Option<u64>,
    /// All seed failures with violation details.
    pub failures: Vec<SeedFailure>,
    /// Seeds whose run exercised at least one fault or race path.
    pub interesting_states_reached: usize,
    /// Items completed across all seeds.
    pub total_items_completed: u64,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Config validation failure or an internal simulation error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut seeds_run = 0_usize;
    let mut seeds_passed = 0_usize;
    let mut first_failure: Option<u64> = None;
    let mut failures = Vec::new();
    let mut interesting_states_reached = 0_usize;
    let mut total_items_completed = 0_u64;

    for seed in config.seed_range.clone() {
        seeds_run += 1;
        let result = replay_seed(seed, config)?;

        if result.interesting_state_reached {
            interesting_states_reached += 1;
        }
        total_items_completed += result.stats.items_completed;

        if result.oracle.passed {
            seeds_passed += 1;
        } else {
            if first_failure.is_none() {
                first_failure = Some(seed);
            }
            failures.push(SeedFailure {
                seed,
                violations: result.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    Ok(CampaignReport {
        seeds_run,
        seeds_passed,
        first_failure,
        failures,
        interesting_states_reached,
        total_items_completed,
    })
}

/// Re-run a single seed with the campaign's parameters.
///
/// # Errors
///
/// Internal simulation failure.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    simulator.run()
}
