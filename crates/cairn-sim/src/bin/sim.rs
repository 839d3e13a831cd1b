#![forbid(unsafe_code)]

use anyhow::Result;
use cairn_sim::campaign::{CampaignConfig, run_campaign};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = CampaignConfig::default();
    let report = run_campaign(&config)?;

    println!(
        "campaign complete: seeds_run={} seeds_passed={} interesting={} items_completed={}",
        report.seeds_run,
        report.seeds_passed,
        report.interesting_states_reached,
        report.total_items_completed,
    );
    if let Some(seed) = report.first_failure {
        println!("first failing seed: {seed}");
        // Machine-readable copy for triage tooling.
        println!("{}", serde_json::to_string_pretty(&report.failures)?);
        std::process::exit(1);
    }

    Ok(())
}
