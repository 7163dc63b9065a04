//! The contract between the coordinator and the indexes it commits.

use crate::index::IndexError;
use crate::storage::BlockId;
use crate::txn::{ComponentId, TxnId, TxnMode};

/// A block image a component wants journaled at prepare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalBlock {
    pub component_id: ComponentId,
    pub block_id: BlockId,
    pub bytes: Vec<u8>,
}

/// A participant in local two-phase commit.
///
/// The coordinator calls these hooks in lifecycle order:
///
/// - startup: `clean_start`, or `start_recovery`, `recover`*, `finish_recovery`
/// - per transaction: `begin`, then `commit_prepare`, `commit`, `commit_end`
///   or `abort`, then `complete`
///
/// `commit` runs only after every participant's prepared blocks are durably
/// journaled. `complete` is always called and must be idempotent.
pub trait TransactionalComponent: Send + Sync {
    fn component_id(&self) -> ComponentId;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Startup with an empty journal.
    fn clean_start(&self) -> Result<(), IndexError>;

    fn start_recovery(&self) -> Result<(), IndexError>;

    /// Install a journaled block image.
    fn recover(&self, block_id: BlockId, bytes: &[u8]) -> Result<(), IndexError>;

    fn finish_recovery(&self) -> Result<(), IndexError>;

    fn begin(&self, txn_id: TxnId, mode: TxnMode) -> Result<(), IndexError>;

    /// Finish the transaction's changes and hand back the blocks to journal.
    fn commit_prepare(&self, txn_id: TxnId) -> Result<Vec<JournalBlock>, IndexError>;

    /// Publish the prepared blocks.
    fn commit(&self, txn_id: TxnId) -> Result<(), IndexError>;

    /// Drop per-transaction state after a commit.
    fn commit_end(&self, txn_id: TxnId);

    /// Discard the transaction's changes.
    fn abort(&self, txn_id: TxnId);

    fn complete(&self, txn_id: TxnId);
}
