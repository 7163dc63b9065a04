//! Deterministic Simulation Testing (DST) infrastructure.
//!
//! Runs a range index through long seeded operation streams with:
//! - In-memory block store and journal that survive simulated crashes
//! - Seeded fault injection on block reads, writes and syncs
//! - A model of the expected contents, checked after every operation
//!
//! Given the same seed, execution is identical.
//!
//! # Usage
//!
//! ```ignore
//! use simulation::{Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(12345).with_fault_config(FaultConfig::low_faults());
//! let result = Simulator::new(config).run(1000);
//!
//! assert!(result.passed());
//! ```

mod invariants;
mod op_gen;
mod simulator;

pub use op_gen::OpGenConfig;
pub use simulator::{Simulator, SimulatorConfig};
