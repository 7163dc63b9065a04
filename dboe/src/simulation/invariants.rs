//! Invariant checking for deterministic simulation testing.
//!
//! The simulator mirrors every operation into a [`Model`] and, after each
//! step, compares what the index returns with what the model expects.

// Simulation code legitimately needs cloning for test data
#![allow(clippy::disallowed_methods)]

use std::collections::BTreeMap;

use crate::index::{Index, RangeIndex};
use crate::txn::Transaction;

/// Key/value contents of the index as the simulator believes them to be.
#[derive(Debug, Default)]
pub struct Model {
    committed: BTreeMap<u32, u32>,
    /// The open write transaction's view, if any.
    pending: Option<BTreeMap<u32, u32>>,
}

impl Model {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.pending = Some(self.committed.clone());
    }

    pub fn insert(&mut self, key: u32, value: u32) {
        if let Some(pending) = &mut self.pending {
            pending.insert(key, value);
        }
    }

    pub fn delete(&mut self, key: u32) {
        if let Some(pending) = &mut self.pending {
            pending.remove(&key);
        }
    }

    pub fn commit(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.committed = pending;
        }
    }

    pub fn abort(&mut self) {
        self.pending = None;
    }

    /// What the open transaction sees, or the committed state.
    #[must_use]
    pub fn visible(&self) -> &BTreeMap<u32, u32> {
        self.pending.as_ref().unwrap_or(&self.committed)
    }

    #[must_use]
    pub const fn committed(&self) -> &BTreeMap<u32, u32> {
        &self.committed
    }
}

/// A broken invariant.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Index of the operation after which it was found.
    pub operation: u64,
    pub description: String,
}

/// Collects invariant violations.
#[derive(Debug, Default)]
pub struct InvariantChecker {
    violations: Vec<InvariantViolation>,
    checks: u64,
}

impl InvariantChecker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, operation: u64, description: impl Into<String>) {
        let description = description.into();
        tracing::warn!(operation, "invariant violated: {description}");
        self.violations.push(InvariantViolation {
            operation,
            description,
        });
    }

    /// Compare everything `txn` sees in `index` with `expected`.
    pub fn check_contents(
        &mut self,
        operation: u64,
        index: &RangeIndex,
        txn: &Transaction,
        expected: &BTreeMap<u32, u32>,
    ) {
        self.checks += 1;
        if let Err(e) = index.check(txn) {
            self.record(operation, format!("structure check failed: {e}"));
            return;
        }

        match index.size(txn) {
            Ok(size) if size == expected.len() as u64 => {}
            Ok(size) => self.record(
                operation,
                format!("size is {size}, expected {}", expected.len()),
            ),
            Err(e) => self.record(operation, format!("size failed: {e}")),
        }

        let actual = index.iter_range_mapped(txn, None, None, |r| decode(r.key(), r.value()));
        let actual: Result<Vec<(u32, u32)>, _> = match actual {
            Ok(iter) => iter.collect(),
            Err(e) => Err(e),
        };
        match actual {
            Ok(actual) => {
                let expected: Vec<(u32, u32)> = expected.iter().map(|(k, v)| (*k, *v)).collect();
                if actual != expected {
                    let first_difference = actual
                        .iter()
                        .zip(&expected)
                        .position(|(a, e)| a != e)
                        .unwrap_or_else(|| actual.len().min(expected.len()));
                    self.record(
                        operation,
                        format!(
                            "contents differ at position {first_difference}: {} records, expected {}",
                            actual.len(),
                            expected.len()
                        ),
                    );
                }
            }
            Err(e) => self.record(operation, format!("scan failed: {e}")),
        }
    }

    #[must_use]
    pub const fn checks(&self) -> u64 {
        self.checks
    }

    pub fn take_violations(&mut self) -> Vec<InvariantViolation> {
        std::mem::take(&mut self.violations)
    }
}

pub fn decode(key: &[u8], value: &[u8]) -> (u32, u32) {
    let mut k = [0u8; 4];
    let mut v = [0u8; 4];
    k.copy_from_slice(&key[..4]);
    v.copy_from_slice(&value[..4]);
    (u32::from_be_bytes(k), u32::from_be_bytes(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_tracks_transactions() {
        let mut model = Model::new();
        model.begin();
        model.insert(1, 10);
        model.insert(2, 20);
        assert_eq!(model.visible().len(), 2);
        assert!(model.committed().is_empty());
        model.commit();
        assert_eq!(model.committed().get(&2), Some(&20));

        model.begin();
        model.delete(1);
        model.abort();
        assert_eq!(model.visible().len(), 2);
    }
}
