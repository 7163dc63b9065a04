//! Index decorator that counts operations and can validate after writes.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::index::{Index, IndexError, RecordIter};
use crate::record::{Record, RecordFactory};
use crate::txn::Transaction;

/// Operation counters for one index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub finds: u64,
    pub inserts: u64,
    pub deletes: u64,
    pub scans: u64,
    /// Structural checks run, including checks after writes.
    pub checks: u64,
}

#[derive(Default)]
struct Counters {
    finds: AtomicU64,
    inserts: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    checks: AtomicU64,
}

/// Wraps an index, counting calls and tracing each one.
///
/// With checking on, every successful write is followed by a full
/// structural check of the inner index.
pub struct TrackedIndex<I> {
    inner: I,
    checking: bool,
    counters: Counters,
}

impl<I: Index> TrackedIndex<I> {
    pub fn new(inner: I, checking: bool) -> Self {
        Self {
            inner,
            checking,
            counters: Counters::default(),
        }
    }

    pub const fn inner(&self) -> &I {
        &self.inner
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let c = &self.counters;
        IndexStats {
            finds: c.finds.load(Ordering::Relaxed),
            inserts: c.inserts.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            scans: c.scans.load(Ordering::Relaxed),
            checks: c.checks.load(Ordering::Relaxed),
        }
    }

    fn after_write(&self, txn: &Transaction, operation: &str) -> Result<(), IndexError> {
        if !self.checking {
            return Ok(());
        }
        self.counters.checks.fetch_add(1, Ordering::Relaxed);
        self.inner.check(txn).inspect_err(|e| {
            tracing::error!(
                index = self.inner.name(),
                txn_id = txn.id(),
                operation,
                "index invalid after write: {e}"
            );
        })
    }
}

impl<I: Index> Index for TrackedIndex<I> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn record_factory(&self) -> RecordFactory {
        self.inner.record_factory()
    }

    fn find(&self, txn: &Transaction, key: &Record) -> Result<Option<Record>, IndexError> {
        self.counters.finds.fetch_add(1, Ordering::Relaxed);
        let found = self.inner.find(txn, key)?;
        tracing::trace!(index = self.name(), txn_id = txn.id(), ?key, hit = found.is_some(), "find");
        Ok(found)
    }

    fn contains(&self, txn: &Transaction, key: &Record) -> Result<bool, IndexError> {
        self.counters.finds.fetch_add(1, Ordering::Relaxed);
        self.inner.contains(txn, key)
    }

    fn insert(&self, txn: &Transaction, record: Record) -> Result<bool, IndexError> {
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(index = self.name(), txn_id = txn.id(), ?record, "insert");
        let added = self.inner.insert(txn, record)?;
        self.after_write(txn, "insert")?;
        Ok(added)
    }

    fn delete(&self, txn: &Transaction, key: &Record) -> Result<bool, IndexError> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(index = self.name(), txn_id = txn.id(), ?key, "delete");
        let removed = self.inner.delete(txn, key)?;
        if removed {
            self.after_write(txn, "delete")?;
        }
        Ok(removed)
    }

    fn size(&self, txn: &Transaction) -> Result<u64, IndexError> {
        self.inner.size(txn)
    }

    fn clear(&self, txn: &Transaction) -> Result<(), IndexError> {
        tracing::debug!(index = self.name(), txn_id = txn.id(), "clear");
        self.inner.clear(txn)?;
        self.after_write(txn, "clear")
    }

    fn check(&self, txn: &Transaction) -> Result<(), IndexError> {
        self.counters.checks.fetch_add(1, Ordering::Relaxed);
        self.inner.check(txn)
    }

    fn min_key(&self, txn: &Transaction) -> Result<Option<Record>, IndexError> {
        self.inner.min_key(txn)
    }

    fn max_key(&self, txn: &Transaction) -> Result<Option<Record>, IndexError> {
        self.inner.max_key(txn)
    }

    fn iter_range<'a>(
        &'a self,
        txn: &'a Transaction,
        min: Option<&Record>,
        max: Option<&Record>,
    ) -> Result<RecordIter<'a>, IndexError> {
        self.counters.scans.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(index = self.name(), txn_id = txn.id(), ?min, ?max, "scan");
        self.inner.iter_range(txn, min, max)
    }
}
