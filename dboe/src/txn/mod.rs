//! Transactions across several indexes.
//!
//! One [`TransactionCoordinator`] drives every index of a dataset through
//! begin, prepare, commit and abort, sharing one redo [`Journal`]. A write
//! transaction's blocks from all indexes are journaled together behind a
//! single commit marker, so after a crash either every index sees the
//! transaction or none does.

mod component;
mod coordinator;
mod journal;

pub use component::{JournalBlock, TransactionalComponent};
pub use coordinator::{
    CoordinatorStats, PrepareError, RecoveryError, RecoveryResult, Transaction,
    TransactionCoordinator, TransactionError, TransactionListener, TxnState,
};
pub use journal::{
    EntryType, Journal, JournalEntry, JournalError, JournalScan, JournalStorage, Lsn,
    MemoryJournal,
};

/// Transaction identifier, unique within one coordinator's lifetime.
pub type TxnId = u64;

/// Identifies an index within a coordinator's journal.
pub type ComponentId = u32;

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnMode {
    Read,
    Write,
}
