//! Node-id tuples over range indexes.
//!
//! A [`TupleIndex`] stores fixed-width tuples of [`NodeId`]s in one column
//! order; a [`TripleTable`] keeps the three orders of a triple set in step
//! under one transaction coordinator.

mod column_map;
mod triple_table;
mod tuple_index;

pub use column_map::ColumnMap;
pub use triple_table::{JOURNAL_FILE, TRIPLE_ORDERS, Triple, TriplePattern, TripleTable};
pub use tuple_index::{TupleIndex, TupleIter};

use crate::index::IndexError;
use crate::record::RecordError;
use crate::storage::StorageError;
use crate::txn::{JournalError, RecoveryError, TransactionError};

/// Identifier of a node (term) in a tuple.
pub type NodeId = u64;

/// Errors from datasets built on tuple indexes.
#[derive(Debug)]
pub enum DatasetError {
    /// I/O error preparing the dataset directory.
    Io(std::io::Error),
    Storage(StorageError),
    Journal(JournalError),
    Index(IndexError),
    Transaction(TransactionError),
    Recovery(RecoveryError),
    Record(RecordError),
    /// A column order that is not a permutation, or does not fit the index.
    InvalidColumnMap(String),
    /// Tuple or pattern of the wrong width.
    WrongArity { expected: usize, actual: usize },
    /// The orderings of a triple table gave different answers for one change.
    IndexesDisagree { triple: Triple, results: Vec<bool> },
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Journal(e) => write!(f, "journal error: {e}"),
            Self::Index(e) => write!(f, "index error: {e}"),
            Self::Transaction(e) => write!(f, "transaction error: {e}"),
            Self::Recovery(e) => write!(f, "recovery error: {e}"),
            Self::Record(e) => write!(f, "record error: {e}"),
            Self::InvalidColumnMap(msg) => write!(f, "invalid column map: {msg}"),
            Self::WrongArity { expected, actual } => {
                write!(f, "tuple has {actual} columns, expected {expected}")
            }
            Self::IndexesDisagree { triple, results } => {
                write!(f, "triple indexes disagree on {triple:?}: {results:?}")
            }
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Journal(e) => Some(e),
            Self::Index(e) => Some(e),
            Self::Transaction(e) => Some(e),
            Self::Recovery(e) => Some(e),
            Self::Record(e) => Some(e),
            Self::InvalidColumnMap(_)
            | Self::WrongArity { .. }
            | Self::IndexesDisagree { .. } => None,
        }
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<StorageError> for DatasetError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<JournalError> for DatasetError {
    fn from(err: JournalError) -> Self {
        Self::Journal(err)
    }
}

impl From<IndexError> for DatasetError {
    fn from(err: IndexError) -> Self {
        Self::Index(err)
    }
}

impl From<TransactionError> for DatasetError {
    fn from(err: TransactionError) -> Self {
        Self::Transaction(err)
    }
}

impl From<RecoveryError> for DatasetError {
    fn from(err: RecoveryError) -> Self {
        Self::Recovery(err)
    }
}

impl From<RecordError> for DatasetError {
    fn from(err: RecordError) -> Self {
        Self::Record(err)
    }
}
