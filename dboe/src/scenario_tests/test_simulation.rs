//! Seeded simulation runs across several seeds.

use crate::simulation::{OpGenConfig, Simulator, SimulatorConfig};
use crate::storage::FaultConfig;

#[test]
fn test_simulation_seeds_without_faults() {
    for seed in [1, 2, 3] {
        let result = Simulator::new(SimulatorConfig::new(seed)).run(400);
        assert!(
            result.passed(),
            "seed {seed}: {:?} {:?}",
            result.error,
            result.invariant_violations
        );
    }
}

#[test]
fn test_simulation_small_key_space_with_faults() {
    let op_config = OpGenConfig {
        key_space: 40,
        ..OpGenConfig::default()
    };
    let config = SimulatorConfig::new(31)
        .with_op_config(op_config)
        .with_fault_config(FaultConfig::low_faults());
    let result = Simulator::new(config).run(2000);
    assert!(result.passed(), "{:?} {:?}", result.error, result.invariant_violations);
    assert!(result.commits > 0);
}
