//! Record-oriented ordered indexes.
//!
//! [`Index`] is the contract every index exposes: point lookup, upsert,
//! delete and range scans over fixed-length [`Record`]s, all inside a
//! [`Transaction`]. [`RangeIndex`] implements it over a disk B+Tree and takes
//! part in the coordinator's two-phase commit. [`TrackedIndex`] wraps any
//! index to count operations and optionally validate after every write.

mod iter;
mod range_index;
mod tracked;

use std::sync::Arc;

pub use iter::IndexIter;
pub use range_index::RangeIndex;
pub use tracked::{IndexStats, TrackedIndex};

use crate::record::{Record, RecordError, RecordFactory};
use crate::storage::btree::TreeError;
use crate::storage::{MetaError, StorageError};
use crate::txn::{Transaction, TxnId};

/// Lazy, ordered stream of records. Stops after the first error.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<Record, IndexError>> + 'a>;

/// An ordered index of fixed-length records.
///
/// Keys compare as unsigned bytes. Lookups take a record whose key part is
/// used; its value part is ignored.
pub trait Index: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Shape of the records this index holds.
    fn record_factory(&self) -> RecordFactory;

    /// The stored record with the same key, if any.
    fn find(&self, txn: &Transaction, key: &Record) -> Result<Option<Record>, IndexError>;

    fn contains(&self, txn: &Transaction, key: &Record) -> Result<bool, IndexError> {
        Ok(self.find(txn, key)?.is_some())
    }

    /// Insert or replace. Returns `true` if the key was not present.
    fn insert(&self, txn: &Transaction, record: Record) -> Result<bool, IndexError>;

    /// Returns `true` if the key was present and removed.
    fn delete(&self, txn: &Transaction, key: &Record) -> Result<bool, IndexError>;

    /// Number of records. Constant time.
    fn size(&self, txn: &Transaction) -> Result<u64, IndexError>;

    fn is_empty(&self, txn: &Transaction) -> Result<bool, IndexError> {
        Ok(self.size(txn)? == 0)
    }

    /// Remove every record.
    fn clear(&self, txn: &Transaction) -> Result<(), IndexError>;

    /// Full structural validation.
    fn check(&self, txn: &Transaction) -> Result<(), IndexError>;

    /// Record with the smallest key.
    fn min_key(&self, txn: &Transaction) -> Result<Option<Record>, IndexError>;

    /// Record with the largest key.
    fn max_key(&self, txn: &Transaction) -> Result<Option<Record>, IndexError>;

    /// Every record in key order.
    fn iter<'a>(&'a self, txn: &'a Transaction) -> Result<RecordIter<'a>, IndexError> {
        self.iter_range(txn, None, None)
    }

    /// Records with `min <= key < max`; either bound may be open.
    fn iter_range<'a>(
        &'a self,
        txn: &'a Transaction,
        min: Option<&Record>,
        max: Option<&Record>,
    ) -> Result<RecordIter<'a>, IndexError>;

    /// [`Index::iter_range`] with each record mapped lazily through `mapper`.
    fn iter_range_mapped<'a, T, F>(
        &'a self,
        txn: &'a Transaction,
        min: Option<&Record>,
        max: Option<&Record>,
        mut mapper: F,
    ) -> Result<Box<dyn Iterator<Item = Result<T, IndexError>> + 'a>, IndexError>
    where
        Self: Sized,
        T: 'a,
        F: FnMut(Record) -> T + 'a,
    {
        let records = self.iter_range(txn, min, max)?;
        Ok(Box::new(records.map(move |r| r.map(&mut mapper))))
    }
}

impl<I: Index + ?Sized> Index for Arc<I> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn record_factory(&self) -> RecordFactory {
        (**self).record_factory()
    }

    fn find(&self, txn: &Transaction, key: &Record) -> Result<Option<Record>, IndexError> {
        (**self).find(txn, key)
    }

    fn contains(&self, txn: &Transaction, key: &Record) -> Result<bool, IndexError> {
        (**self).contains(txn, key)
    }

    fn insert(&self, txn: &Transaction, record: Record) -> Result<bool, IndexError> {
        (**self).insert(txn, record)
    }

    fn delete(&self, txn: &Transaction, key: &Record) -> Result<bool, IndexError> {
        (**self).delete(txn, key)
    }

    fn size(&self, txn: &Transaction) -> Result<u64, IndexError> {
        (**self).size(txn)
    }

    fn clear(&self, txn: &Transaction) -> Result<(), IndexError> {
        (**self).clear(txn)
    }

    fn check(&self, txn: &Transaction) -> Result<(), IndexError> {
        (**self).check(txn)
    }

    fn min_key(&self, txn: &Transaction) -> Result<Option<Record>, IndexError> {
        (**self).min_key(txn)
    }

    fn max_key(&self, txn: &Transaction) -> Result<Option<Record>, IndexError> {
        (**self).max_key(txn)
    }

    fn iter_range<'a>(
        &'a self,
        txn: &'a Transaction,
        min: Option<&Record>,
        max: Option<&Record>,
    ) -> Result<RecordIter<'a>, IndexError> {
        (**self).iter_range(txn, min, max)
    }
}

/// Errors from index operations.
#[derive(Debug)]
pub enum IndexError {
    Tree(TreeError),
    Storage(StorageError),
    Record(RecordError),
    /// The index has no state for this transaction.
    NoTransaction { txn_id: TxnId },
    /// A write was attempted in a read transaction.
    ReadOnlyTransaction,
    /// The transaction has already prepared, committed or aborted.
    TransactionFinished,
    /// The transaction changed the index while an iterator was open.
    ConcurrentModification,
    /// Another write transaction holds the index.
    WriterBusy { active: TxnId },
    /// An earlier write failed part-way; the transaction can only abort.
    Poisoned { txn_id: TxnId },
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Record(e) => write!(f, "{e}"),
            Self::NoTransaction { txn_id } => {
                write!(f, "transaction {txn_id} is not registered with this index")
            }
            Self::ReadOnlyTransaction => write!(f, "write in a read transaction"),
            Self::TransactionFinished => write!(f, "transaction is no longer active"),
            Self::ConcurrentModification => {
                write!(f, "index modified by its transaction while iterating")
            }
            Self::WriterBusy { active } => {
                write!(f, "write transaction {active} is already active")
            }
            Self::Poisoned { txn_id } => {
                write!(f, "transaction {txn_id} failed mid-write and must abort")
            }
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tree(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Record(e) => Some(e),
            Self::NoTransaction { .. }
            | Self::ReadOnlyTransaction
            | Self::TransactionFinished
            | Self::ConcurrentModification
            | Self::WriterBusy { .. }
            | Self::Poisoned { .. } => None,
        }
    }
}

impl From<TreeError> for IndexError {
    fn from(e: TreeError) -> Self {
        Self::Tree(e)
    }
}

impl From<StorageError> for IndexError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<MetaError> for IndexError {
    fn from(e: MetaError) -> Self {
        Self::Storage(StorageError::Meta(e))
    }
}

impl From<RecordError> for IndexError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}
