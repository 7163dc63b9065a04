//! Transaction coordinator: local two-phase commit and crash recovery.
//!
//! # Commit protocol
//!
//! 1. Prepare: every component finishes its changes and returns the block
//!    images to journal. All of them are appended to the journal followed by
//!    one commit marker, then the journal is synced. A failure here aborts
//!    the whole transaction.
//! 2. Commit: with the commit lock held exclusively, every component
//!    publishes its prepared blocks. New transactions begin under the shared
//!    commit lock, so a reader's snapshots across indexes are always taken at
//!    the same commit.
//! 3. Commit end: the journal is truncated and per-transaction state dropped.
//!
//! Single writer: at most one write transaction is active; `begin` for a
//! second writer blocks until the first completes. Readers never block.
//!
//! # Recovery
//!
//! At startup every journaled transaction with a commit marker (and no later
//! abort marker) is replayed in journal order. Redo entries without a commit
//! marker are discarded. The journal is then truncated.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use crate::index::IndexError;
use crate::txn::component::{JournalBlock, TransactionalComponent};
use crate::txn::journal::{EntryType, Journal, JournalEntry, JournalError};
use crate::txn::{ComponentId, TxnId, TxnMode};

/// Transaction lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Preparing,
    Prepared,
    Committing,
    Committed,
    Aborted,
    Complete,
}

/// Observer of transaction lifecycle events.
pub trait TransactionListener: Send + Sync {
    fn on_begin(&self, _txn_id: TxnId, _mode: TxnMode) {}
    fn on_prepare(&self, _txn_id: TxnId) {}
    fn on_commit(&self, _txn_id: TxnId) {}
    fn on_abort(&self, _txn_id: TxnId) {}
    fn on_complete(&self, _txn_id: TxnId) {}
}

/// Snapshot of coordinator counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub read_begun: u64,
    pub write_begun: u64,
    pub committed: u64,
    pub aborted: u64,
    pub completed: u64,
    pub active_readers: u64,
    pub active_writers: u64,
    /// Advanced on every write commit.
    pub data_version: u64,
}

#[derive(Default)]
struct Counters {
    read_begun: AtomicU64,
    write_begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    completed: AtomicU64,
    active_readers: AtomicU64,
    active_writers: AtomicU64,
}

/// Outcome of startup recovery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Valid journal entries read.
    pub entries_scanned: usize,
    /// Committed transactions rolled forward.
    pub transactions_replayed: usize,
    /// Transactions without a commit marker, or explicitly aborted.
    pub transactions_discarded: usize,
    pub blocks_replayed: usize,
    /// Bytes of torn entry at the end of the journal.
    pub torn_bytes: u64,
}

struct Inner {
    components: Vec<Arc<dyn TransactionalComponent>>,
    journal: Mutex<Journal>,
    writer_active: Mutex<bool>,
    writer_released: Condvar,
    commit_lock: RwLock<()>,
    next_txn_id: AtomicU64,
    data_version: AtomicU64,
    counters: Counters,
    listeners: RwLock<Vec<Arc<dyn TransactionListener>>>,
    started: AtomicBool,
    /// Set when the live stores may not match the journal; only a restart
    /// with recovery fixes that.
    needs_recovery: AtomicBool,
}

impl Inner {
    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    fn notify(&self, event: impl Fn(&dyn TransactionListener)) {
        for listener in self.listeners.read().expect("lock poisoned").iter() {
            event(listener.as_ref());
        }
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn acquire_writer(&self) {
        let mut active = self.writer_active.lock().expect("lock poisoned");
        while *active {
            active = self.writer_released.wait(active).expect("lock poisoned");
        }
        *active = true;
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn release_writer(&self) {
        *self.writer_active.lock().expect("lock poisoned") = false;
        self.writer_released.notify_one();
    }

    fn component(&self, component_id: ComponentId) -> Option<&Arc<dyn TransactionalComponent>> {
        self.components
            .iter()
            .find(|c| c.component_id() == component_id)
    }

    /// Append a transaction's blocks and commit marker, then sync.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn journal_commit(&self, txn_id: TxnId, blocks: Vec<JournalBlock>) -> Result<(), JournalError> {
        let mut journal = self.journal.lock().expect("lock poisoned");
        for block in blocks {
            let mut entry =
                JournalEntry::redo(txn_id, block.component_id, block.block_id, block.bytes);
            journal.append(&mut entry)?;
        }
        journal.append(&mut JournalEntry::commit(txn_id))?;
        journal.sync()
    }
}

/// Drives transactions across a fixed set of components.
pub struct TransactionCoordinator {
    inner: Arc<Inner>,
}

impl TransactionCoordinator {
    /// Create a coordinator over `components`, which must have distinct ids.
    ///
    /// [`TransactionCoordinator::start`] must run before any transaction
    /// begins.
    pub fn new(
        journal: Journal,
        components: Vec<Arc<dyn TransactionalComponent>>,
    ) -> Result<Self, TransactionError> {
        let mut seen = HashSet::new();
        for component in &components {
            if !seen.insert(component.component_id()) {
                return Err(TransactionError::DuplicateComponent(component.component_id()));
            }
        }
        Ok(Self {
            inner: Arc::new(Inner {
                components,
                journal: Mutex::new(journal),
                writer_active: Mutex::new(false),
                writer_released: Condvar::new(),
                commit_lock: RwLock::new(()),
                next_txn_id: AtomicU64::new(1),
                data_version: AtomicU64::new(0),
                counters: Counters::default(),
                listeners: RwLock::new(Vec::new()),
                started: AtomicBool::new(false),
                needs_recovery: AtomicBool::new(false),
            }),
        })
    }

    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    pub fn add_listener(&self, listener: Arc<dyn TransactionListener>) {
        self.inner
            .listeners
            .write()
            .expect("lock poisoned")
            .push(listener);
    }

    /// Recover from the journal (or clean start if it is empty).
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn start(&self) -> Result<RecoveryResult, RecoveryError> {
        if self.inner.started.load(Ordering::Acquire) {
            return Err(RecoveryError::AlreadyStarted);
        }
        let inner = &self.inner;
        let mut journal = inner.journal.lock().expect("lock poisoned");
        let scan = journal.read_all()?;

        let mut result = RecoveryResult {
            entries_scanned: scan.entries.len(),
            torn_bytes: scan.torn_bytes,
            ..RecoveryResult::default()
        };

        if scan.entries.is_empty() {
            for component in &inner.components {
                component
                    .clean_start()
                    .map_err(|source| RecoveryError::component(component.as_ref(), source))?;
            }
            if scan.torn_bytes > 0 {
                journal.truncate()?;
            }
            tracing::info!(components = inner.components.len(), "clean start");
        } else {
            tracing::info!(entries = scan.entries.len(), "recovering from journal");
            for component in &inner.components {
                component
                    .start_recovery()
                    .map_err(|source| RecoveryError::component(component.as_ref(), source))?;
            }

            let aborted: HashSet<TxnId> = scan
                .entries
                .iter()
                .filter(|e| e.entry_type == EntryType::Abort)
                .map(|e| e.txn_id)
                .collect();
            let mut pending: HashMap<TxnId, Vec<JournalEntry>> = HashMap::new();
            let mut highest_txn = 0;

            for entry in scan.entries {
                highest_txn = highest_txn.max(entry.txn_id);
                match entry.entry_type {
                    EntryType::Redo => pending.entry(entry.txn_id).or_default().push(entry),
                    EntryType::Commit if aborted.contains(&entry.txn_id) => {}
                    EntryType::Commit => {
                        let group = pending.remove(&entry.txn_id).unwrap_or_default();
                        for redo in group {
                            let component = inner.component(redo.component_id).ok_or(
                                RecoveryError::UnknownComponent {
                                    component_id: redo.component_id,
                                    txn_id: redo.txn_id,
                                },
                            )?;
                            component
                                .recover(redo.block_id, &redo.payload)
                                .map_err(|source| {
                                    RecoveryError::component(component.as_ref(), source)
                                })?;
                            result.blocks_replayed += 1;
                        }
                        result.transactions_replayed += 1;
                    }
                    EntryType::Abort => {
                        if pending.remove(&entry.txn_id).is_some() {
                            result.transactions_discarded += 1;
                        }
                    }
                }
            }
            result.transactions_discarded += pending.len();

            for component in &inner.components {
                component
                    .finish_recovery()
                    .map_err(|source| RecoveryError::component(component.as_ref(), source))?;
            }
            journal.truncate()?;
            inner.next_txn_id.store(highest_txn + 1, Ordering::Release);
            tracing::info!(
                replayed = result.transactions_replayed,
                discarded = result.transactions_discarded,
                blocks = result.blocks_replayed,
                "recovery complete"
            );
        }

        inner.started.store(true, Ordering::Release);
        Ok(result)
    }

    /// Begin a transaction. A write transaction waits for any active writer
    /// to complete.
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn begin(&self, mode: TxnMode) -> Result<Transaction, TransactionError> {
        let inner = &self.inner;
        if !inner.started.load(Ordering::Acquire) {
            return Err(TransactionError::NotStarted);
        }
        if inner.needs_recovery.load(Ordering::Acquire) {
            return Err(TransactionError::NeedsRecovery);
        }
        if mode == TxnMode::Write {
            inner.acquire_writer();
        }

        let txn_id = inner.next_txn_id.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = Self::begin_components(inner, txn_id, mode) {
            if mode == TxnMode::Write {
                inner.release_writer();
            }
            return Err(e);
        }

        let counters = &inner.counters;
        match mode {
            TxnMode::Read => {
                counters.read_begun.fetch_add(1, Ordering::Relaxed);
                counters.active_readers.fetch_add(1, Ordering::Relaxed);
            }
            TxnMode::Write => {
                counters.write_begun.fetch_add(1, Ordering::Relaxed);
                counters.active_writers.fetch_add(1, Ordering::Relaxed);
            }
        }
        inner.notify(|l| l.on_begin(txn_id, mode));
        tracing::debug!(txn_id, ?mode, "transaction begun");

        Ok(Transaction {
            id: txn_id,
            mode,
            state: TxnState::Active,
            journaled: false,
            inner: Arc::clone(&self.inner),
        })
    }

    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    fn begin_components(inner: &Inner, txn_id: TxnId, mode: TxnMode) -> Result<(), TransactionError> {
        let _commit = inner.commit_lock.read().expect("lock poisoned");
        for (i, component) in inner.components.iter().enumerate() {
            if let Err(source) = component.begin(txn_id, mode) {
                for begun in &inner.components[..=i] {
                    begun.abort(txn_id);
                    begun.complete(txn_id);
                }
                return Err(TransactionError::Begin {
                    component_id: component.component_id(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Run `f` in a write transaction, committing if it succeeds and
    /// aborting otherwise.
    pub fn execute_write<R, E>(
        &self,
        f: impl FnOnce(&Transaction) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<TransactionError>,
    {
        let mut txn = self.begin(TxnMode::Write)?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                txn.complete();
                Ok(value)
            }
            Err(e) => {
                txn.complete();
                Err(e)
            }
        }
    }

    /// Run `f` in a read transaction.
    pub fn execute_read<R, E>(&self, f: impl FnOnce(&Transaction) -> Result<R, E>) -> Result<R, E>
    where
        E: From<TransactionError>,
    {
        let mut txn = self.begin(TxnMode::Read)?;
        let result = f(&txn);
        txn.complete();
        result
    }

    #[must_use]
    pub fn data_version(&self) -> u64 {
        self.inner.data_version.load(Ordering::Acquire)
    }

    /// True after a commit failed half-way; the dataset must be reopened.
    #[must_use]
    pub fn needs_recovery(&self) -> bool {
        self.inner.needs_recovery.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        let c = &self.inner.counters;
        CoordinatorStats {
            read_begun: c.read_begun.load(Ordering::Relaxed),
            write_begun: c.write_begun.load(Ordering::Relaxed),
            committed: c.committed.load(Ordering::Relaxed),
            aborted: c.aborted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            active_readers: c.active_readers.load(Ordering::Relaxed),
            active_writers: c.active_writers.load(Ordering::Relaxed),
            data_version: self.data_version(),
        }
    }
}

/// A transaction across every component of a coordinator.
///
/// Dropping a transaction that was not committed aborts it.
pub struct Transaction {
    id: TxnId,
    mode: TxnMode,
    state: TxnState,
    /// Blocks for this transaction may be in the journal.
    journaled: bool,
    inner: Arc<Inner>,
}

impl Transaction {
    #[must_use]
    pub const fn id(&self) -> TxnId {
        self.id
    }

    #[must_use]
    pub const fn mode(&self) -> TxnMode {
        self.mode
    }

    #[must_use]
    pub const fn state(&self) -> TxnState {
        self.state
    }

    /// True while reads and writes are allowed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    fn expect_state(&self, expected: TxnState, operation: &'static str) -> Result<(), TransactionError> {
        if self.state != expected {
            return Err(TransactionError::InvalidState {
                txn_id: self.id,
                state: self.state,
                operation,
            });
        }
        Ok(())
    }

    /// Phase one: collect every component's changes and make them durable.
    ///
    /// On failure the transaction is aborted.
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn prepare(&mut self) -> Result<(), TransactionError> {
        self.expect_state(TxnState::Active, "prepare")?;
        if self.mode == TxnMode::Read {
            self.state = TxnState::Prepared;
            return Ok(());
        }

        self.state = TxnState::Preparing;
        let inner = Arc::clone(&self.inner);
        let mut blocks = Vec::new();
        for component in &inner.components {
            match component.commit_prepare(self.id) {
                Ok(mut prepared) => blocks.append(&mut prepared),
                Err(source) => {
                    return Err(self.fail_prepare(PrepareError::Component {
                        component_id: component.component_id(),
                        source,
                    }));
                }
            }
        }

        if !blocks.is_empty() {
            let block_count = blocks.len();
            self.journaled = true;
            if let Err(e) = inner.journal_commit(self.id, blocks) {
                return Err(self.fail_prepare(PrepareError::Journal(e)));
            }
            tracing::debug!(txn_id = self.id, blocks = block_count, "transaction journaled");
        }

        self.state = TxnState::Prepared;
        inner.notify(|l| l.on_prepare(self.id));
        Ok(())
    }

    fn fail_prepare(&mut self, source: PrepareError) -> TransactionError {
        tracing::warn!(txn_id = self.id, "prepare failed, aborting: {source}");
        self.abort_inner();
        TransactionError::PrepareFailed {
            txn_id: self.id,
            source,
        }
    }

    /// Prepare (if not yet done) and commit.
    #[allow(clippy::expect_used)] // Lock poisoning indicates unrecoverable state
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        if self.state == TxnState::Active {
            self.prepare()?;
        }
        self.expect_state(TxnState::Prepared, "commit")?;
        self.state = TxnState::Committing;

        let inner = Arc::clone(&self.inner);
        if self.mode == TxnMode::Write {
            {
                let _apply = inner.commit_lock.write().expect("lock poisoned");
                for component in &inner.components {
                    if let Err(source) = component.commit(self.id) {
                        inner.needs_recovery.store(true, Ordering::Release);
                        tracing::error!(
                            txn_id = self.id,
                            component = component.name(),
                            "commit failed after journaling, restart to recover: {source}"
                        );
                        return Err(TransactionError::CommitFailed {
                            txn_id: self.id,
                            component_id: component.component_id(),
                            source,
                        });
                    }
                }
            }

            if self.journaled {
                if let Err(e) = inner.journal.lock().expect("lock poisoned").truncate() {
                    tracing::warn!(
                        txn_id = self.id,
                        "journal truncate failed, transaction will replay on restart: {e}"
                    );
                }
                self.journaled = false;
            }
            for component in &inner.components {
                component.commit_end(self.id);
            }
            inner.data_version.fetch_add(1, Ordering::AcqRel);
        }

        self.state = TxnState::Committed;
        inner.counters.committed.fetch_add(1, Ordering::Relaxed);
        inner.notify(|l| l.on_commit(self.id));
        tracing::debug!(txn_id = self.id, "transaction committed");
        Ok(())
    }

    /// Discard the transaction's changes.
    pub fn abort(&mut self) -> Result<(), TransactionError> {
        match self.state {
            TxnState::Active | TxnState::Prepared => {
                self.abort_inner();
                Ok(())
            }
            TxnState::Aborted => Ok(()),
            state => Err(TransactionError::InvalidState {
                txn_id: self.id,
                state,
                operation: "abort",
            }),
        }
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    fn abort_inner(&mut self) {
        let inner = Arc::clone(&self.inner);
        for component in &inner.components {
            component.abort(self.id);
        }

        if self.journaled {
            let mut journal = inner.journal.lock().expect("lock poisoned");
            let marked = journal
                .append(&mut JournalEntry::abort(self.id))
                .and_then(|_| journal.sync());
            if let Err(e) = journal.truncate() {
                if marked.is_err() {
                    inner.needs_recovery.store(true, Ordering::Release);
                    tracing::error!(
                        txn_id = self.id,
                        "cannot retract journaled transaction, restart to recover: {e}"
                    );
                } else {
                    tracing::warn!(txn_id = self.id, "journal truncate failed after abort: {e}");
                }
            }
            self.journaled = false;
        }

        self.state = TxnState::Aborted;
        inner.counters.aborted.fetch_add(1, Ordering::Relaxed);
        inner.notify(|l| l.on_abort(self.id));
        tracing::debug!(txn_id = self.id, "transaction aborted");
    }

    /// Final cleanup, aborting first if the transaction never committed.
    /// Safe to call more than once.
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn complete(&mut self) {
        match self.state {
            TxnState::Complete => return,
            TxnState::Active | TxnState::Preparing | TxnState::Prepared => self.abort_inner(),
            TxnState::Committing => {
                // Commit failed part-way; the journal keeps it for recovery.
                for component in &self.inner.components {
                    component.abort(self.id);
                }
            }
            TxnState::Committed | TxnState::Aborted => {}
        }

        let inner = Arc::clone(&self.inner);
        for component in &inner.components {
            component.complete(self.id);
        }
        let counters = &inner.counters;
        match self.mode {
            TxnMode::Read => counters.active_readers.fetch_sub(1, Ordering::Relaxed),
            TxnMode::Write => {
                inner.release_writer();
                counters.active_writers.fetch_sub(1, Ordering::Relaxed)
            }
        };
        counters.completed.fetch_add(1, Ordering::Relaxed);
        self.state = TxnState::Complete;
        inner.notify(|l| l.on_complete(self.id));
    }

    /// Stop dead after a successful prepare, as if the process crashed
    /// before the commit was applied.
    #[cfg(test)]
    pub(crate) fn crash(mut self) {
        self.state = TxnState::Complete;
        if self.mode == TxnMode::Write {
            self.inner.release_writer();
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TxnState::Complete {
            self.complete();
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Why a prepare failed.
#[derive(Debug)]
pub enum PrepareError {
    Component {
        component_id: ComponentId,
        source: IndexError,
    },
    Journal(JournalError),
}

impl std::fmt::Display for PrepareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Component {
                component_id,
                source,
            } => write!(f, "component {component_id}: {source}"),
            Self::Journal(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PrepareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Component { source, .. } => Some(source),
            Self::Journal(e) => Some(e),
        }
    }
}

/// Errors that can occur driving a transaction.
#[derive(Debug)]
pub enum TransactionError {
    /// `start` has not run.
    NotStarted,
    /// A commit failed part-way; reopen to recover.
    NeedsRecovery,
    DuplicateComponent(ComponentId),
    InvalidState {
        txn_id: TxnId,
        state: TxnState,
        operation: &'static str,
    },
    Begin {
        component_id: ComponentId,
        source: IndexError,
    },
    /// The transaction was aborted.
    PrepareFailed { txn_id: TxnId, source: PrepareError },
    CommitFailed {
        txn_id: TxnId,
        component_id: ComponentId,
        source: IndexError,
    },
}

impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "coordinator not started"),
            Self::NeedsRecovery => write!(f, "a commit failed part-way; reopen to recover"),
            Self::DuplicateComponent(id) => write!(f, "duplicate component id {id}"),
            Self::InvalidState {
                txn_id,
                state,
                operation,
            } => write!(f, "cannot {operation} transaction {txn_id} in state {state:?}"),
            Self::Begin {
                component_id,
                source,
            } => write!(f, "component {component_id} failed to begin: {source}"),
            Self::PrepareFailed { txn_id, source } => {
                write!(f, "prepare failed for transaction {txn_id}: {source}")
            }
            Self::CommitFailed {
                txn_id,
                component_id,
                source,
            } => write!(
                f,
                "commit of transaction {txn_id} failed in component {component_id}: {source}"
            ),
        }
    }
}

impl std::error::Error for TransactionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Begin { source, .. } | Self::CommitFailed { source, .. } => Some(source),
            Self::PrepareFailed { source, .. } => Some(source),
            Self::NotStarted
            | Self::NeedsRecovery
            | Self::DuplicateComponent(_)
            | Self::InvalidState { .. } => None,
        }
    }
}

/// Errors that stop startup recovery.
///
/// A torn entry at the end of the journal is not one of them: replay stops
/// at the last valid entry.
#[derive(Debug)]
pub enum RecoveryError {
    AlreadyStarted,
    Journal(JournalError),
    /// A journal entry names a component that is not registered.
    UnknownComponent {
        component_id: ComponentId,
        txn_id: TxnId,
    },
    Component {
        component_id: ComponentId,
        source: IndexError,
    },
}

impl RecoveryError {
    fn component(component: &dyn TransactionalComponent, source: IndexError) -> Self {
        tracing::error!(component = component.name(), "recovery failed: {source}");
        Self::Component {
            component_id: component.component_id(),
            source,
        }
    }
}

impl std::fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "coordinator already started"),
            Self::Journal(e) => write!(f, "recovery journal error: {e}"),
            Self::UnknownComponent {
                component_id,
                txn_id,
            } => write!(
                f,
                "journal entry for transaction {txn_id} names unknown component {component_id}"
            ),
            Self::Component {
                component_id,
                source,
            } => write!(f, "recovery failed in component {component_id}: {source}"),
        }
    }
}

impl std::error::Error for RecoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Journal(e) => Some(e),
            Self::Component { source, .. } => Some(source),
            Self::AlreadyStarted | Self::UnknownComponent { .. } => None,
        }
    }
}

impl From<JournalError> for RecoveryError {
    fn from(e: JournalError) -> Self {
        Self::Journal(e)
    }
}
