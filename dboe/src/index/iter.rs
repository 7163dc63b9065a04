//! Transaction-scoped index iterators.
//!
//! A read transaction iterates its snapshot, which later commits cannot
//! change. A write transaction iterates its own overlay and fails fast: if
//! the transaction modifies the index after the iterator was created, the
//! next step yields `ConcurrentModification` and the iterator ends.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::index::IndexError;
use crate::index::range_index::WriterSlot;
use crate::record::Record;
use crate::storage::btree::{BlockAccess, NodeLayout, RangeIter};
use crate::storage::{Block, BlockId, ReadView, StorageError, TreeMeta};
use crate::txn::TxnId;

/// Where an iterator reads blocks from.
pub(crate) enum Source<'a> {
    Snapshot(ReadView),
    Writer {
        slot: &'a Mutex<Option<WriterSlot>>,
        txn_id: TxnId,
    },
}

impl Source<'_> {
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_writer(
        slot: &Mutex<Option<WriterSlot>>,
    ) -> MutexGuard<'_, Option<WriterSlot>> {
        slot.lock().expect("lock poisoned")
    }

    fn missing(txn_id: TxnId) -> StorageError {
        StorageError::Corruption(format!("write transaction {txn_id} has no overlay"))
    }
}

impl BlockAccess for Source<'_> {
    fn tree_meta(&self) -> Result<TreeMeta, StorageError> {
        match self {
            Self::Snapshot(view) => view.meta(),
            Self::Writer { slot, txn_id } => Self::lock_writer(slot)
                .as_ref()
                .filter(|s| s.txn_id == *txn_id)
                .map(|s| *s.overlay.meta())
                .ok_or_else(|| Self::missing(*txn_id)),
        }
    }

    fn read_block(&self, block_id: BlockId) -> Result<Arc<Block>, StorageError> {
        match self {
            Self::Snapshot(view) => view.read(block_id),
            Self::Writer { slot, txn_id } => {
                let guard = Self::lock_writer(slot);
                let writer = guard
                    .as_ref()
                    .filter(|s| s.txn_id == *txn_id)
                    .ok_or_else(|| Self::missing(*txn_id))?;
                writer.overlay.get_read(block_id)
            }
        }
    }
}

/// Ordered records of one index within one transaction.
pub struct IndexIter<'a> {
    records: RangeIter<Source<'a>>,
    /// Overlay change count when a writer's iterator was created.
    stamp: Option<u64>,
    done: bool,
}

impl<'a> IndexIter<'a> {
    pub(crate) fn snapshot(
        view: ReadView,
        layout: NodeLayout,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            records: RangeIter::new(Source::Snapshot(view), layout, min, max)?,
            stamp: None,
            done: false,
        })
    }

    pub(crate) fn writer(
        slot: &'a Mutex<Option<WriterSlot>>,
        txn_id: TxnId,
        stamp: u64,
        layout: NodeLayout,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            records: RangeIter::new(Source::Writer { slot, txn_id }, layout, min, max)?,
            stamp: Some(stamp),
            done: false,
        })
    }

    /// Fail if the writer has moved on since the iterator was created.
    fn validate(&self) -> Result<(), IndexError> {
        let Some(stamp) = self.stamp else {
            return Ok(());
        };
        let Source::Writer { slot, txn_id } = self.records.access() else {
            return Ok(());
        };
        let guard = Source::lock_writer(slot);
        match guard.as_ref().filter(|s| s.txn_id == *txn_id) {
            None => Err(IndexError::TransactionFinished),
            Some(writer) if writer.overlay.changes() != stamp => {
                Err(IndexError::ConcurrentModification)
            }
            Some(_) => Ok(()),
        }
    }
}

impl Iterator for IndexIter<'_> {
    type Item = Result<Record, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.validate() {
            self.done = true;
            return Some(Err(e));
        }
        match self.records.next() {
            Some(Ok(record)) => Some(Ok(record)),
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e.into()))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
