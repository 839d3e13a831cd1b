//! Property sweep: the protocol invariants hold for any seed.

use proptest::prelude::*;

use cairn_sim::faults::FaultConfig;
use cairn_sim::{SimulationConfig, Simulator};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        ..ProptestConfig::default()
    })]

    #[test]
    fn any_seed_holds_the_invariants(
        seed in 0_u64..10_000,
        worker_count in 1_usize..6,
        item_count in 1_usize..10,
    ) {
        let mut simulator = Simulator::new(SimulationConfig {
            seed,
            worker_count,
            item_count,
            rounds: 64,
            fault: FaultConfig::default(),
        })
        .expect("config");
        let result = simulator.run().expect("run");
        prop_assert!(
            result.oracle.passed,
            "seed {} violations: {:?}",
            seed,
            result.oracle.violations
        );
    }

    #[test]
    fn runs_are_replayable(seed in 0_u64..10_000) {
        let config = SimulationConfig {
            seed,
            worker_count: 3,
            item_count: 5,
            rounds: 48,
            fault: FaultConfig::default(),
        };
        let first = Simulator::new(config).expect("config").run().expect("run");
        let second = Simulator::new(config).expect("config").run().expect("run");
        prop_assert_eq!(first, second);
    }
}
