//! A transactional B+Tree index over one block store.
//!
//! # Transactions
//!
//! - A write transaction owns the index's single writer slot: a private
//!   [`Overlay`] that every write goes through. Nothing reaches the block
//!   manager until the coordinator commits.
//! - A read transaction pins the committed version current at its begin and
//!   reads through a [`ReadView`], so later commits are invisible to it.
//!
//! A write that fails after changing the overlay leaves the tree in an
//! unknown state, so the slot is poisoned: further operations and the
//! prepare fail and the transaction can only abort.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::IndexConfig;
use crate::index::iter::IndexIter;
use crate::index::{Index, IndexError, RecordIter};
use crate::record::{Record, RecordError, RecordFactory};
use crate::storage::btree::{BPlusTree, BlockAccess, NodeLayout, TreeError, empty_tree_blocks};
use crate::storage::{
    Block, BlockId, BlockManager, BlockStore, CacheStats, MemoryStore, Overlay, ReadView,
    StorageError,
};
use crate::txn::{ComponentId, JournalBlock, Transaction, TransactionalComponent, TxnId, TxnMode};

/// The active write transaction's state.
pub(crate) struct WriterSlot {
    pub(crate) txn_id: TxnId,
    pub(crate) overlay: Overlay,
    /// Blocks handed to the journal, applied at commit.
    prepared: Option<Vec<(BlockId, Block)>>,
    poisoned: bool,
}

/// Ordered index of fixed-length records stored in a B+Tree.
pub struct RangeIndex {
    name: String,
    component_id: ComponentId,
    manager: Arc<BlockManager>,
    layout: NodeLayout,
    writer: Mutex<Option<WriterSlot>>,
    /// Read transaction -> pinned committed version.
    readers: Mutex<HashMap<TxnId, u64>>,
}

impl RangeIndex {
    /// Open the index stored in `store`, formatting it if the store is empty.
    ///
    /// With no order configured, an existing index keeps its stored order and
    /// a new one gets the largest order the block size allows.
    ///
    /// # Errors
    ///
    /// Fails if the configuration cannot form a tree, the store's block size
    /// differs from the configured one, or an existing index was created with
    /// a different record shape or order.
    pub fn open(
        name: impl Into<String>,
        component_id: ComponentId,
        store: Box<dyn BlockStore>,
        config: &IndexConfig,
    ) -> Result<Self, IndexError> {
        let name = name.into();
        let factory = RecordFactory::new(config.key_length, config.value_length);
        let mut layout = NodeLayout::new(config.block_size, factory, config.order, config.checking)?;
        if store.block_size() != config.block_size {
            return Err(StorageError::BlockSizeMismatch {
                expected: config.block_size,
                actual: store.block_size(),
            }
            .into());
        }

        let manager = Arc::new(BlockManager::new(store, config.cache_blocks, config.max_blocks));
        if manager.store_block_count() == 0 {
            manager.format(&empty_tree_blocks(&layout))?;
            tracing::info!(
                index = %name,
                block_size = config.block_size,
                order = layout.order(),
                "formatted new index"
            );
        } else {
            let meta = manager.current_meta()?;
            if config.order.is_none() && meta.order != layout.order() {
                layout = NodeLayout::new(
                    config.block_size,
                    factory,
                    Some(meta.order),
                    config.checking,
                )?;
            }
            meta.validate(factory.key_length(), factory.value_length(), layout.order())?;
            tracing::info!(
                index = %name,
                records = meta.record_count,
                height = meta.height,
                blocks = meta.block_count,
                "opened index"
            );
        }

        Ok(Self {
            name,
            component_id,
            manager,
            layout,
            writer: Mutex::new(None),
            readers: Mutex::new(HashMap::new()),
        })
    }

    /// Open a fresh index held entirely in memory.
    pub fn in_memory(
        name: impl Into<String>,
        component_id: ComponentId,
        config: &IndexConfig,
    ) -> Result<Self, IndexError> {
        Self::open(
            name,
            component_id,
            Box::new(MemoryStore::new(config.block_size)),
            config,
        )
    }

    #[must_use]
    pub const fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.manager.cache_stats()
    }

    /// Version of the latest commit applied to this index.
    #[must_use]
    pub fn committed_version(&self) -> u64 {
        self.manager.version()
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn writer(&self) -> MutexGuard<'_, Option<WriterSlot>> {
        self.writer.lock().expect("lock poisoned")
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn readers(&self) -> MutexGuard<'_, HashMap<TxnId, u64>> {
        self.readers.lock().expect("lock poisoned")
    }

    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    fn read_view(&self, txn_id: TxnId) -> Result<ReadView, IndexError> {
        let version = self
            .readers()
            .get(&txn_id)
            .copied()
            .ok_or(IndexError::NoTransaction { txn_id })?;
        Ok(ReadView::new(Arc::clone(&self.manager), version))
    }

    fn check_key(&self, key: &Record) -> Result<(), IndexError> {
        let key_length = self.layout.factory().key_length();
        if key.key().len() != key_length {
            return Err(RecordError::InvalidRecordLength {
                expected: key_length,
                actual: key.key().len(),
            }
            .into());
        }
        Ok(())
    }

    /// Run a read against the transaction's view of the tree.
    fn read_op<R>(
        &self,
        txn: &Transaction,
        op: impl FnOnce(&BPlusTree<'_, &dyn BlockAccess>) -> Result<R, TreeError>,
    ) -> Result<R, IndexError> {
        if !txn.is_active() {
            return Err(IndexError::TransactionFinished);
        }
        match txn.mode() {
            TxnMode::Read => {
                let view = self.read_view(txn.id())?;
                Ok(op(&BPlusTree::new(&view as &dyn BlockAccess, &self.layout))?)
            }
            TxnMode::Write => {
                let guard = self.writer();
                let slot = active_slot(guard.as_ref(), txn.id())?;
                Ok(op(&BPlusTree::new(&slot.overlay as &dyn BlockAccess, &self.layout))?)
            }
        }
    }

    /// Run a write against the transaction's overlay, poisoning the slot if
    /// it fails after changing anything.
    fn write_op<R>(
        &self,
        txn: &Transaction,
        op: impl FnOnce(&mut BPlusTree<'_, &mut Overlay>) -> Result<R, TreeError>,
    ) -> Result<R, IndexError> {
        if !txn.is_active() {
            return Err(IndexError::TransactionFinished);
        }
        if txn.mode() == TxnMode::Read {
            return Err(IndexError::ReadOnlyTransaction);
        }
        let txn_id = txn.id();
        let mut guard = self.writer();
        let slot = guard
            .as_mut()
            .filter(|s| s.txn_id == txn_id)
            .ok_or(IndexError::NoTransaction { txn_id })?;
        if slot.poisoned {
            return Err(IndexError::Poisoned { txn_id });
        }

        let before = slot.overlay.changes();
        let result = op(&mut BPlusTree::new(&mut slot.overlay, &self.layout));
        result.map_err(|e| {
            if slot.overlay.changes() != before {
                slot.poisoned = true;
                tracing::warn!(
                    index = %self.name,
                    txn_id,
                    "write failed part-way, transaction must abort: {e}"
                );
            }
            e.into()
        })
    }

    /// Mark `txn`'s writes as unusable so the transaction can only abort.
    /// Does nothing if `txn` does not hold the writer slot.
    pub fn poison(&self, txn: &Transaction, reason: &str) {
        let txn_id = txn.id();
        let mut guard = self.writer();
        if let Some(slot) = guard.as_mut().filter(|s| s.txn_id == txn_id) {
            slot.poisoned = true;
            tracing::warn!(index = %self.name, txn_id, "transaction poisoned: {reason}");
        }
    }

    /// Drop the writer slot if `txn_id` holds it.
    fn release_writer(&self, txn_id: TxnId) -> bool {
        let mut guard = self.writer();
        if guard.as_ref().is_some_and(|s| s.txn_id == txn_id) {
            *guard = None;
            return true;
        }
        false
    }

    fn validate_meta(&self) -> Result<(), IndexError> {
        let meta = self.manager.current_meta()?;
        let factory = self.layout.factory();
        meta.validate(factory.key_length(), factory.value_length(), self.layout.order())?;
        Ok(())
    }
}

/// The writer slot for `txn_id`, if it is usable.
fn active_slot(slot: Option<&WriterSlot>, txn_id: TxnId) -> Result<&WriterSlot, IndexError> {
    let slot = slot
        .filter(|s| s.txn_id == txn_id)
        .ok_or(IndexError::NoTransaction { txn_id })?;
    if slot.poisoned {
        return Err(IndexError::Poisoned { txn_id });
    }
    Ok(slot)
}

impl Index for RangeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn record_factory(&self) -> RecordFactory {
        self.layout.factory()
    }

    fn find(&self, txn: &Transaction, key: &Record) -> Result<Option<Record>, IndexError> {
        self.check_key(key)?;
        self.read_op(txn, |tree| tree.find(key.key()))
    }

    fn insert(&self, txn: &Transaction, record: Record) -> Result<bool, IndexError> {
        self.write_op(txn, |tree| tree.insert(record))
    }

    fn delete(&self, txn: &Transaction, key: &Record) -> Result<bool, IndexError> {
        self.check_key(key)?;
        self.write_op(txn, |tree| tree.delete(key.key()))
    }

    fn size(&self, txn: &Transaction) -> Result<u64, IndexError> {
        self.read_op(txn, |tree| tree.len())
    }

    fn clear(&self, txn: &Transaction) -> Result<(), IndexError> {
        self.write_op(txn, |tree| tree.clear())
    }

    fn check(&self, txn: &Transaction) -> Result<(), IndexError> {
        self.read_op(txn, |tree| tree.check())
    }

    fn min_key(&self, txn: &Transaction) -> Result<Option<Record>, IndexError> {
        self.read_op(txn, |tree| tree.min_record())
    }

    fn max_key(&self, txn: &Transaction) -> Result<Option<Record>, IndexError> {
        self.read_op(txn, |tree| tree.max_record())
    }

    fn iter_range<'a>(
        &'a self,
        txn: &'a Transaction,
        min: Option<&Record>,
        max: Option<&Record>,
    ) -> Result<RecordIter<'a>, IndexError> {
        if !txn.is_active() {
            return Err(IndexError::TransactionFinished);
        }
        let min = min.map(Record::key);
        let max = max.map(Record::key);
        let iter = match txn.mode() {
            TxnMode::Read => IndexIter::snapshot(self.read_view(txn.id())?, self.layout, min, max)?,
            TxnMode::Write => {
                let stamp = active_slot(self.writer().as_ref(), txn.id())?.overlay.changes();
                IndexIter::writer(&self.writer, txn.id(), stamp, self.layout, min, max)?
            }
        };
        Ok(Box::new(iter))
    }
}

impl TransactionalComponent for RangeIndex {
    fn component_id(&self) -> ComponentId {
        self.component_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn clean_start(&self) -> Result<(), IndexError> {
        self.validate_meta()
    }

    fn start_recovery(&self) -> Result<(), IndexError> {
        tracing::info!(index = %self.name, "replaying journaled blocks");
        Ok(())
    }

    fn recover(&self, block_id: BlockId, bytes: &[u8]) -> Result<(), IndexError> {
        if bytes.len() != self.layout.block_size() {
            return Err(StorageError::BlockSizeMismatch {
                expected: self.layout.block_size(),
                actual: bytes.len(),
            }
            .into());
        }
        self.manager
            .recover_block(block_id, &Block::from_vec(bytes.to_vec()))?;
        Ok(())
    }

    fn finish_recovery(&self) -> Result<(), IndexError> {
        self.manager.finish_recovery()?;
        self.validate_meta()
    }

    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    fn begin(&self, txn_id: TxnId, mode: TxnMode) -> Result<(), IndexError> {
        match mode {
            TxnMode::Read => {
                let version = self.manager.register_reader();
                self.readers().insert(txn_id, version);
            }
            TxnMode::Write => {
                let mut guard = self.writer();
                if let Some(active) = guard.as_ref() {
                    return Err(IndexError::WriterBusy {
                        active: active.txn_id,
                    });
                }
                *guard = Some(WriterSlot {
                    txn_id,
                    overlay: Overlay::begin(Arc::clone(&self.manager))?,
                    prepared: None,
                    poisoned: false,
                });
            }
        }
        tracing::trace!(index = %self.name, txn_id, ?mode, "joined transaction");
        Ok(())
    }

    fn commit_prepare(&self, txn_id: TxnId) -> Result<Vec<JournalBlock>, IndexError> {
        let mut guard = self.writer();
        let Some(slot) = guard.as_mut().filter(|s| s.txn_id == txn_id) else {
            return Ok(Vec::new());
        };
        if slot.poisoned {
            return Err(IndexError::Poisoned { txn_id });
        }

        let blocks = slot.overlay.prepare();
        let journal: Vec<JournalBlock> = blocks
            .iter()
            .map(|(block_id, block)| JournalBlock {
                component_id: self.component_id,
                block_id: *block_id,
                bytes: block.as_bytes().to_vec(),
            })
            .collect();
        tracing::debug!(index = %self.name, txn_id, blocks = blocks.len(), "prepared");
        slot.prepared = Some(blocks);
        Ok(journal)
    }

    fn commit(&self, txn_id: TxnId) -> Result<(), IndexError> {
        let mut guard = self.writer();
        let Some(slot) = guard.as_mut().filter(|s| s.txn_id == txn_id) else {
            return Ok(());
        };
        let blocks = slot.prepared.take().unwrap_or_default();
        if !blocks.is_empty() {
            let version = self.manager.apply(&blocks)?;
            tracing::debug!(index = %self.name, txn_id, version, "committed");
        }
        Ok(())
    }

    fn commit_end(&self, txn_id: TxnId) {
        self.release_writer(txn_id);
    }

    fn abort(&self, txn_id: TxnId) {
        if self.release_writer(txn_id) {
            tracing::debug!(index = %self.name, txn_id, "discarded overlay");
        }
    }

    fn complete(&self, txn_id: TxnId) {
        self.release_writer(txn_id);
        let version = self.readers().remove(&txn_id);
        if let Some(version) = version {
            self.manager.unregister_reader(version);
        }
    }
}
