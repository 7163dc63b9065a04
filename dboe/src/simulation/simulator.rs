//! Main simulator harness for deterministic simulation testing.
//!
//! Drives one range index and its coordinator through a seeded stream of
//! operations over fault-injecting in-memory storage, crashing and
//! recovering along the way, and checks the index against a model after
//! every step.

// Simulation code legitimately needs cloning for test data
#![allow(clippy::disallowed_methods)]

use std::sync::Arc;

use super::invariants::{InvariantChecker, InvariantViolation, Model, decode};
use super::op_gen::{CrashPoint, OpGenConfig, OpGenerator, Operation};
use crate::config::IndexConfig;
use crate::index::{Index, IndexError, RangeIndex};
use crate::record::{Record, RecordFactory};
use crate::storage::{FaultConfig, FaultInjector, MemoryStore};
use crate::txn::{
    Journal, MemoryJournal, Transaction, TransactionCoordinator, TransactionalComponent, TxnMode,
};

/// Configuration for the simulator.
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Faults injected into the block store while operations run.
    pub fault_config: FaultConfig,
    pub op_config: OpGenConfig,
    /// Small blocks give deep trees from few keys.
    pub block_size: usize,
    pub cache_blocks: usize,
}

impl SimulatorConfig {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            fault_config: FaultConfig::no_faults(),
            op_config: OpGenConfig::default(),
            block_size: 256,
            cache_blocks: 16,
        }
    }

    #[must_use]
    pub const fn with_fault_config(mut self, config: FaultConfig) -> Self {
        self.fault_config = config;
        self
    }

    #[must_use]
    pub const fn with_op_config(mut self, config: OpGenConfig) -> Self {
        self.op_config = config;
        self
    }
}

/// Results from a simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    pub seed: u64,
    pub operations_processed: u64,
    pub successful_operations: u64,
    /// Operations that returned an error, injected or not.
    pub failed_operations: u64,
    pub commits: u64,
    pub aborts: u64,
    pub crashes: u64,
    pub invariant_violations: Vec<InvariantViolation>,
    pub completed_successfully: bool,
    pub error: Option<String>,
}

impl SimulationResult {
    /// Check if the simulation passed (no invariant violations).
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.completed_successfully && self.invariant_violations.is_empty()
    }
}

/// One open index with its coordinator.
struct Stack {
    index: Arc<RangeIndex>,
    coordinator: TransactionCoordinator,
}

/// The main simulator harness.
pub struct Simulator {
    config: SimulatorConfig,
    generator: OpGenerator,
    checker: InvariantChecker,
    model: Model,
    faults: FaultInjector,
    store: MemoryStore,
    journal: MemoryJournal,
    factory: RecordFactory,
    operations_processed: u64,
    successful_operations: u64,
    failed_operations: u64,
    commits: u64,
    aborts: u64,
    crashes: u64,
}

impl Simulator {
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let faults = FaultInjector::new(config.seed, FaultConfig::no_faults());
        Self {
            generator: OpGenerator::with_config(config.seed, config.op_config),
            checker: InvariantChecker::new(),
            model: Model::new(),
            store: MemoryStore::with_faults(config.block_size, faults.clone()),
            journal: MemoryJournal::new(),
            factory: RecordFactory::new(4, 4),
            faults,
            config,
            operations_processed: 0,
            successful_operations: 0,
            failed_operations: 0,
            commits: 0,
            aborts: 0,
            crashes: 0,
        }
    }

    /// Open the index over the shared store and journal, recovering from
    /// whatever the last run left behind.
    fn open(&self) -> Result<Stack, String> {
        self.faults.set_config(FaultConfig::no_faults());
        let config = IndexConfig::new(4, 4)
            .with_block_size(self.config.block_size)
            .with_cache_blocks(self.config.cache_blocks)
            .with_checking(true);
        let index = Arc::new(
            RangeIndex::open("sim", 0, Box::new(self.store.reopen()), &config)
                .map_err(|e| format!("open index: {e}"))?,
        );
        let journal = Journal::open(Box::new(self.journal.reopen()), true)
            .map_err(|e| format!("open journal: {e}"))?;
        let coordinator = TransactionCoordinator::new(
            journal,
            vec![Arc::clone(&index) as Arc<dyn TransactionalComponent>],
        )
        .map_err(|e| format!("coordinator: {e}"))?;
        let recovery = coordinator.start().map_err(|e| format!("recovery: {e}"))?;
        tracing::debug!(?recovery, "simulated restart");
        Ok(Stack { index, coordinator })
    }

    fn record(&self, key: u32, value: u32) -> Result<Record, IndexError> {
        Ok(self
            .factory
            .create_from_parts(&key.to_be_bytes(), &value.to_be_bytes())?)
    }

    fn key(&self, key: u32) -> Result<Record, IndexError> {
        Ok(self.factory.create_key(&key.to_be_bytes())?)
    }

    /// Run the simulation for `operation_count` operations.
    pub fn run(&mut self, operation_count: usize) -> SimulationResult {
        let outcome = self.run_inner(operation_count);
        SimulationResult {
            seed: self.config.seed,
            operations_processed: self.operations_processed,
            successful_operations: self.successful_operations,
            failed_operations: self.failed_operations,
            commits: self.commits,
            aborts: self.aborts,
            crashes: self.crashes,
            invariant_violations: self.checker.take_violations(),
            completed_successfully: outcome.is_ok(),
            error: outcome.err(),
        }
    }

    fn run_inner(&mut self, operation_count: usize) -> Result<(), String> {
        let mut stack = self.open()?;
        let mut txn: Option<Transaction> = None;

        for _ in 0..operation_count {
            if txn.is_none() {
                txn = Some(
                    stack
                        .coordinator
                        .begin(TxnMode::Write)
                        .map_err(|e| format!("begin: {e}"))?,
                );
                self.model.begin();
            }
            let op = self.generator.next_op();
            self.operations_processed += 1;

            self.faults.set_config(self.config.fault_config);
            let ended = match (op, txn.take()) {
                (Operation::Commit, Some(t)) => self.commit(t, &mut stack)?,
                (Operation::Abort, Some(mut t)) => {
                    if let Err(e) = t.abort() {
                        return Err(format!("abort: {e}"));
                    }
                    self.aborts += 1;
                    self.model.abort();
                    self.successful_operations += 1;
                    true
                }
                (Operation::Crash(point), Some(t)) => {
                    self.crash(point, t);
                    stack = self.open()?;
                    true
                }
                (op, Some(t)) => {
                    let ok = self.apply(op, &stack.index, &t);
                    if ok {
                        txn = Some(t);
                    } else {
                        drop(t);
                        self.aborts += 1;
                        self.model.abort();
                    }
                    !ok
                }
                (_, None) => return Err("no open transaction".to_string()),
            };
            self.faults.set_config(FaultConfig::no_faults());

            let step = self.operations_processed;
            match &txn {
                Some(t) if !ended => {
                    self.checker
                        .check_contents(step, &stack.index, t, self.model.visible());
                }
                _ => {
                    let reader = stack
                        .coordinator
                        .begin(TxnMode::Read)
                        .map_err(|e| format!("begin read: {e}"))?;
                    self.checker
                        .check_contents(step, &stack.index, &reader, self.model.committed());
                }
            }
        }
        Ok(())
    }

    /// Apply one index operation. Returns `false` if it failed and the
    /// transaction was abandoned.
    fn apply(&mut self, op: Operation, index: &RangeIndex, txn: &Transaction) -> bool {
        let result = match op {
            Operation::Insert { key, value } => self
                .record(key, value)
                .and_then(|r| index.insert(txn, r))
                .map(|_| self.model.insert(key, value)),
            Operation::Delete { key } => self
                .key(key)
                .and_then(|k| index.delete(txn, &k))
                .map(|_| self.model.delete(key)),
            Operation::Find { key } => self.key(key).and_then(|k| index.find(txn, &k)).map(|found| {
                let found = found.map(|r| decode(r.key(), r.value()).1);
                if found != self.model.visible().get(&key).copied() {
                    self.checker.record(
                        self.operations_processed,
                        format!("find({key}) returned {found:?}"),
                    );
                }
            }),
            Operation::Scan { min, max } => self.scan(index, txn, min, max),
            Operation::Commit | Operation::Abort | Operation::Crash(_) => Ok(()),
        };

        match result {
            Ok(()) => {
                self.successful_operations += 1;
                true
            }
            Err(e) => {
                self.failed_operations += 1;
                tracing::debug!(?op, "operation failed, abandoning transaction: {e}");
                matches!(op, Operation::Find { .. } | Operation::Scan { .. })
                    && !matches!(e, IndexError::Poisoned { .. })
            }
        }
    }

    fn scan(&mut self, index: &RangeIndex, txn: &Transaction, min: u32, max: u32) -> Result<(), IndexError> {
        let (lo, hi) = (self.key(min)?, self.key(max)?);
        let found = index
            .iter_range_mapped(txn, Some(&lo), Some(&hi), |r| decode(r.key(), r.value()).0)?
            .collect::<Result<Vec<u32>, _>>()?;
        let expected: Vec<u32> = self.model.visible().range(min..max).map(|(k, _)| *k).collect();
        if found != expected {
            self.checker.record(
                self.operations_processed,
                format!("scan [{min}, {max}) returned {} keys, expected {}", found.len(), expected.len()),
            );
        }
        Ok(())
    }

    fn commit(&mut self, mut txn: Transaction, stack: &mut Stack) -> Result<bool, String> {
        match txn.commit() {
            Ok(()) => {
                self.commits += 1;
                self.successful_operations += 1;
                self.model.commit();
            }
            Err(e) if stack.coordinator.needs_recovery() => {
                // Journaled but not applied: a restart rolls it forward.
                tracing::debug!("commit failed after journaling: {e}");
                self.failed_operations += 1;
                drop(txn);
                self.model.commit();
                self.crashes += 1;
                *stack = self.open()?;
            }
            Err(e) => {
                tracing::debug!("commit failed before journaling: {e}");
                self.failed_operations += 1;
                self.aborts += 1;
                self.model.abort();
            }
        }
        Ok(true)
    }

    fn crash(&mut self, point: CrashPoint, mut txn: Transaction) {
        self.crashes += 1;
        match point {
            CrashPoint::BeforePrepare => {
                self.successful_operations += 1;
                self.model.abort();
                txn.crash();
            }
            CrashPoint::AfterPrepare => match txn.prepare() {
                Ok(()) => {
                    self.successful_operations += 1;
                    self.model.commit();
                    txn.crash();
                }
                Err(e) => {
                    tracing::debug!("prepare failed before crash: {e}");
                    self.failed_operations += 1;
                    self.model.abort();
                }
            },
        }
    }

    #[must_use]
    pub const fn checker(&self) -> &InvariantChecker {
        &self.checker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_basic() {
        let mut simulator = Simulator::new(SimulatorConfig::new(12345));
        let result = simulator.run(500);

        assert!(result.completed_successfully, "{:?}", result.error);
        assert_eq!(result.operations_processed, 500);
        assert_eq!(
            result.successful_operations + result.failed_operations,
            500,
            "no faults, so every operation is accounted for once"
        );
        assert!(result.passed(), "{:?}", result.invariant_violations);
        assert!(simulator.checker().checks() >= 500);
    }

    #[test]
    fn test_simulator_deterministic() {
        let result1 = Simulator::new(SimulatorConfig::new(777)).run(300);
        let result2 = Simulator::new(SimulatorConfig::new(777)).run(300);

        assert_eq!(result1.successful_operations, result2.successful_operations);
        assert_eq!(result1.failed_operations, result2.failed_operations);
        assert_eq!(result1.commits, result2.commits);
        assert_eq!(result1.crashes, result2.crashes);
    }

    #[test]
    fn test_simulator_crashes_and_recovers() {
        let op_config = OpGenConfig {
            end_rate: 0.2,
            crash_rate: 0.5,
            ..OpGenConfig::default()
        };
        let config = SimulatorConfig::new(54321).with_op_config(op_config);
        let result = Simulator::new(config).run(600);

        assert!(result.crashes > 0);
        assert!(result.passed(), "{:?} {:?}", result.error, result.invariant_violations);
    }

    #[test]
    fn test_simulator_with_storage_faults() {
        let faults = FaultConfig {
            read_error_rate: 0.002,
            write_error_rate: 0.01,
            sync_error_rate: 0.01,
        };
        let config = SimulatorConfig::new(2024).with_fault_config(faults);
        let result = Simulator::new(config).run(1000);

        assert!(result.passed(), "{:?} {:?}", result.error, result.invariant_violations);
    }

    #[test]
    fn test_simulator_short_crash_run_across_sign_bit() {
        let op_config = OpGenConfig {
            key_space: 200,
            key_base: 0x7fff_ff9c,
            end_rate: 0.1,
            crash_rate: 0.4,
            ..OpGenConfig::default()
        };
        let config = SimulatorConfig::new(9001)
            .with_op_config(op_config)
            .with_fault_config(FaultConfig::low_faults());
        let result = Simulator::new(config).run(400);

        assert!(result.crashes > 0);
        assert!(result.commits > 0);
        assert!(result.passed(), "{:?} {:?}", result.error, result.invariant_violations);
    }

    #[test]
    #[ignore] // Long running test
    fn test_simulator_stress() {
        for seed in 0..20 {
            let config = SimulatorConfig::new(seed).with_fault_config(FaultConfig::low_faults());
            let result = Simulator::new(config).run(10_000);
            assert!(result.passed(), "seed {seed}: {:?}", result.invariant_violations);
        }
    }
}
