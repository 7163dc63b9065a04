//! Operation generator for deterministic simulation testing.
//!
//! Produces a random but reproducible stream of index operations and
//! transaction boundaries from a seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for operation generation.
#[derive(Debug, Clone, Copy)]
pub struct OpGenConfig {
    /// Keys are drawn from `key_base..key_base + key_space`.
    pub key_space: u32,
    /// Lowest generated key.
    pub key_base: u32,
    /// Probability that an operation is an insert.
    pub insert_rate: f64,
    /// Probability that an operation is a delete.
    pub delete_rate: f64,
    /// Probability that an operation is a range scan. The rest are finds.
    pub scan_rate: f64,
    /// Probability of ending the transaction after an operation.
    pub end_rate: f64,
    /// Share of transaction ends that abort instead of commit.
    pub abort_rate: f64,
    /// Share of transaction ends that crash the process.
    pub crash_rate: f64,
}

impl Default for OpGenConfig {
    fn default() -> Self {
        Self {
            key_space: 500,
            key_base: 0,
            insert_rate: 0.5,
            delete_rate: 0.25,
            scan_rate: 0.05,
            end_rate: 0.05,
            abort_rate: 0.2,
            crash_rate: 0.1,
        }
    }
}

/// How a simulated crash meets the open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Before anything was journaled.
    BeforePrepare,
    /// After the transaction was journaled but before it was applied.
    AfterPrepare,
}

/// One simulated step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert { key: u32, value: u32 },
    Delete { key: u32 },
    Find { key: u32 },
    Scan { min: u32, max: u32 },
    Commit,
    Abort,
    Crash(CrashPoint),
}

/// Seeded generator of [`Operation`]s.
pub struct OpGenerator {
    rng: StdRng,
    config: OpGenConfig,
}

impl OpGenerator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, OpGenConfig::default())
    }

    #[must_use]
    pub fn with_config(seed: u64, config: OpGenConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    fn key(&mut self) -> u32 {
        let offset = self.rng.random_range(0..self.config.key_space.max(1));
        self.config.key_base.saturating_add(offset)
    }

    /// Next operation in the stream.
    pub fn next_op(&mut self) -> Operation {
        let config = self.config;
        if self.rng.random_bool(config.end_rate) {
            let roll: f64 = self.rng.random();
            return if roll < config.crash_rate {
                if self.rng.random_bool(0.5) {
                    Operation::Crash(CrashPoint::AfterPrepare)
                } else {
                    Operation::Crash(CrashPoint::BeforePrepare)
                }
            } else if roll < config.crash_rate + config.abort_rate {
                Operation::Abort
            } else {
                Operation::Commit
            };
        }

        let roll: f64 = self.rng.random();
        if roll < config.insert_rate {
            Operation::Insert {
                key: self.key(),
                value: self.rng.random(),
            }
        } else if roll < config.insert_rate + config.delete_rate {
            Operation::Delete { key: self.key() }
        } else if roll < config.insert_rate + config.delete_rate + config.scan_rate {
            let a = self.key();
            let b = self.key();
            Operation::Scan {
                min: a.min(b),
                max: a.max(b),
            }
        } else {
            Operation::Find { key: self.key() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = OpGenerator::new(7);
        let mut b = OpGenerator::new(7);
        for _ in 0..500 {
            assert_eq!(a.next_op(), b.next_op());
        }
    }

    #[test]
    fn test_keys_stay_in_key_space() {
        let config = OpGenConfig {
            key_space: 10,
            ..OpGenConfig::default()
        };
        let mut ops = OpGenerator::with_config(3, config);
        for _ in 0..1000 {
            match ops.next_op() {
                Operation::Insert { key, .. } | Operation::Delete { key } | Operation::Find { key } => {
                    assert!(key < 10);
                }
                Operation::Scan { min, max } => assert!(min <= max && max < 10),
                Operation::Commit | Operation::Abort | Operation::Crash(_) => {}
            }
        }
    }

    #[test]
    fn test_key_base_shifts_keys() {
        let config = OpGenConfig {
            key_space: 100,
            key_base: 0x7fff_ffd0,
            ..OpGenConfig::default()
        };
        let mut ops = OpGenerator::with_config(11, config);
        let mut saw_high_bit = false;
        for _ in 0..1000 {
            if let Operation::Insert { key, .. } = ops.next_op() {
                assert!((0x7fff_ffd0..0x8000_0034).contains(&key));
                saw_high_bit |= key >= 0x8000_0000;
            }
        }
        assert!(saw_high_bit);
    }
}
