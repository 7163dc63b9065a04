//! Seeded fault injection for in-memory stores and journals.
//!
//! A `FaultInjector` is a cheap handle to shared state, so a test can keep
//! one copy and turn faults on or off after the store it guards has been
//! handed to an index.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for fault injection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
}

impl FaultConfig {
    /// A fault config with no faults (for baseline testing).
    #[must_use]
    pub const fn no_faults() -> Self {
        Self {
            read_error_rate: 0.0,
            write_error_rate: 0.0,
            sync_error_rate: 0.0,
        }
    }

    /// A fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            sync_error_rate: 0.001,
        }
    }

    /// Every write and sync fails.
    #[must_use]
    pub const fn failing_writes() -> Self {
        Self {
            read_error_rate: 0.0,
            write_error_rate: 1.0,
            sync_error_rate: 1.0,
        }
    }
}

/// Counters of operations seen and faults injected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FaultStats {
    pub reads: u64,
    pub writes: u64,
    pub syncs: u64,
    pub injected_read_errors: u64,
    pub injected_write_errors: u64,
    pub injected_sync_errors: u64,
}

struct FaultState {
    config: FaultConfig,
    rng: StdRng,
    stats: FaultStats,
}

/// Shared, seeded fault injector.
#[derive(Clone)]
pub struct FaultInjector {
    state: Arc<Mutex<FaultState>>,
}

/// The kind of operation being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Read,
    Write,
    Sync,
}

impl FaultInjector {
    /// Create an injector with the given seed and fault rates.
    ///
    /// The same seed produces the same sequence of faults.
    #[must_use]
    pub fn new(seed: u64, config: FaultConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(FaultState {
                config,
                rng: StdRng::seed_from_u64(seed),
                stats: FaultStats::default(),
            })),
        }
    }

    /// An injector that never fails.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, FaultConfig::no_faults())
    }

    /// Replace the fault rates.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn set_config(&self, config: FaultConfig) {
        self.state.lock().expect("lock poisoned").config = config;
    }

    /// Snapshot of the counters.
    #[must_use]
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn stats(&self) -> FaultStats {
        self.state.lock().expect("lock poisoned").stats
    }

    /// Count the operation and decide whether it fails.
    ///
    /// Returns a description of the injected fault, or `None` to proceed.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn check(&self, point: FaultPoint, what: &str) -> Option<String> {
        let mut state = self.state.lock().expect("lock poisoned");
        let rate = match point {
            FaultPoint::Read => {
                state.stats.reads += 1;
                state.config.read_error_rate
            }
            FaultPoint::Write => {
                state.stats.writes += 1;
                state.config.write_error_rate
            }
            FaultPoint::Sync => {
                state.stats.syncs += 1;
                state.config.sync_error_rate
            }
        };
        if rate <= 0.0 || state.rng.random::<f64>() >= rate {
            return None;
        }
        match point {
            FaultPoint::Read => state.stats.injected_read_errors += 1,
            FaultPoint::Write => state.stats.injected_write_errors += 1,
            FaultPoint::Sync => state.stats.injected_sync_errors += 1,
        }
        Some(format!("{point:?} fault on {what}"))
    }
}

impl std::fmt::Debug for FaultInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjector").finish_non_exhaustive()
    }
}
