//! Triples stored in three orderings under one transaction coordinator.

use std::sync::Arc;

use crate::config::{DatasetConfig, IndexConfig};
use crate::index::RangeIndex;
use crate::storage::{BlockStore, FileStore, MemoryStore};
use crate::tuple::tuple_index::TupleIter;
use crate::tuple::{ColumnMap, DatasetError, NodeId, TupleIndex};
use crate::txn::{
    Journal, MemoryJournal, RecoveryResult, Transaction, TransactionCoordinator,
    TransactionalComponent, TxnMode,
};

/// Column names in natural order.
const NATURAL: &str = "SPO";

/// Index orderings, primary first.
pub const TRIPLE_ORDERS: [&str; 3] = ["SPO", "POS", "OSP"];

/// Journal file name inside the dataset directory.
pub const JOURNAL_FILE: &str = "journal.jrnl";

pub type Triple = [NodeId; 3];

/// Subject, predicate, object; `None` matches anything.
pub type TriplePattern = [Option<NodeId>; 3];

/// A set of triples kept in SPO, POS and OSP order.
///
/// Every change goes to all three indexes inside one transaction, so they
/// commit or abort together.
pub struct TripleTable {
    indexes: Vec<TupleIndex>,
    coordinator: TransactionCoordinator,
    /// Treat disagreement between the orderings as an error.
    checking: bool,
}

impl TripleTable {
    /// Open (or create) the table stored in `config.directory`, replaying
    /// the journal if the last run did not finish cleanly.
    pub fn open(config: &DatasetConfig) -> Result<(Self, RecoveryResult), DatasetError> {
        std::fs::create_dir_all(&config.directory)?;

        let mut stores: Vec<Box<dyn BlockStore>> = Vec::with_capacity(TRIPLE_ORDERS.len());
        for order in TRIPLE_ORDERS {
            let path = config
                .directory
                .join(format!("{}.idx", order.to_ascii_lowercase()));
            stores.push(Box::new(FileStore::open(&path, config.block_size)?));
        }
        let journal = Journal::open_file(&config.directory.join(JOURNAL_FILE), config.sync_journal)?;

        let table = Self::assemble(stores, journal, &config.index_config(24, 0))?;
        let recovery = table.coordinator.start()?;
        tracing::info!(
            directory = %config.directory.display(),
            replayed = recovery.transactions_replayed,
            "opened triple table"
        );
        Ok((table, recovery))
    }

    /// A fresh table held in memory.
    pub fn in_memory(config: &DatasetConfig) -> Result<Self, DatasetError> {
        let stores: Vec<Box<dyn BlockStore>> = TRIPLE_ORDERS
            .iter()
            .map(|_| Box::new(MemoryStore::new(config.block_size)) as Box<dyn BlockStore>)
            .collect();
        let journal = Journal::open(Box::new(MemoryJournal::new()), false)?;
        let table = Self::assemble(stores, journal, &config.index_config(24, 0))?;
        table.coordinator.start()?;
        Ok(table)
    }

    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    fn assemble(
        stores: Vec<Box<dyn BlockStore>>,
        journal: Journal,
        config: &IndexConfig,
    ) -> Result<Self, DatasetError> {
        let mut indexes = Vec::with_capacity(stores.len());
        let mut components: Vec<Arc<dyn TransactionalComponent>> = Vec::new();
        for (component_id, (order, store)) in (0..).zip(TRIPLE_ORDERS.into_iter().zip(stores)) {
            let index = Arc::new(RangeIndex::open(order, component_id, store, config)?);
            components.push(Arc::clone(&index) as Arc<dyn TransactionalComponent>);
            indexes.push(TupleIndex::new(
                ColumnMap::new(NATURAL, order)?,
                index,
                config.checking,
            )?);
        }
        let coordinator = TransactionCoordinator::new(journal, components)?;
        Ok(Self {
            indexes,
            coordinator,
            checking: config.checking,
        })
    }

    #[must_use]
    pub const fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn begin(&self, mode: TxnMode) -> Result<Transaction, DatasetError> {
        Ok(self.coordinator.begin(mode)?)
    }

    /// The indexes, in [`TRIPLE_ORDERS`] order.
    #[must_use]
    pub fn indexes(&self) -> &[TupleIndex] {
        &self.indexes
    }

    /// Apply `op` to every index; the primary index's answer wins.
    ///
    /// With checking on, indexes that disagree poison the transaction and
    /// the change fails with [`DatasetError::IndexesDisagree`].
    fn for_each_index(
        &self,
        txn: &Transaction,
        triple: &Triple,
        op: impl Fn(&TupleIndex) -> Result<bool, DatasetError>,
    ) -> Result<bool, DatasetError> {
        let results = self
            .indexes
            .iter()
            .map(op)
            .collect::<Result<Vec<bool>, _>>()?;
        let primary = results.first().copied().unwrap_or(false);
        if results.iter().all(|r| *r == primary) {
            return Ok(primary);
        }
        if !self.checking {
            tracing::warn!(?triple, ?results, "triple indexes disagree");
            return Ok(primary);
        }
        for index in &self.indexes {
            index.index().inner().poison(txn, "triple indexes disagree");
        }
        Err(DatasetError::IndexesDisagree {
            triple: *triple,
            results,
        })
    }

    /// Returns `true` if the triple was new.
    pub fn add(&self, txn: &Transaction, triple: Triple) -> Result<bool, DatasetError> {
        self.for_each_index(txn, &triple, |index| index.add(txn, &triple))
    }

    /// Returns `true` if the triple was present.
    pub fn delete(&self, txn: &Transaction, triple: Triple) -> Result<bool, DatasetError> {
        self.for_each_index(txn, &triple, |index| index.delete(txn, &triple))
    }

    pub fn contains(&self, txn: &Transaction, triple: Triple) -> Result<bool, DatasetError> {
        self.primary()?.contains(txn, &triple)
    }

    pub fn size(&self, txn: &Transaction) -> Result<u64, DatasetError> {
        self.primary()?.size(txn)
    }

    /// Structural check of every index.
    pub fn check(&self, txn: &Transaction) -> Result<(), DatasetError> {
        for index in &self.indexes {
            crate::index::Index::check(index.index(), txn)?;
        }
        Ok(())
    }

    fn primary(&self) -> Result<&TupleIndex, DatasetError> {
        self.indexes
            .first()
            .ok_or_else(|| DatasetError::InvalidColumnMap("triple table has no indexes".to_string()))
    }

    /// The index whose order puts the most bound columns first. Ties go to
    /// the earlier index.
    #[must_use]
    pub fn choose_index(&self, pattern: &TriplePattern) -> Option<&TupleIndex> {
        self.indexes
            .iter()
            .rev()
            .max_by_key(|index| index.bound_prefix(pattern))
    }

    /// Triples matching `pattern`, in the order of the chosen index.
    pub fn find<'a>(
        &'a self,
        txn: &'a Transaction,
        pattern: &TriplePattern,
    ) -> Result<TupleIter<'a>, DatasetError> {
        let index = self.choose_index(pattern).map_or_else(|| self.primary(), Ok)?;
        tracing::trace!(?pattern, index = index.name(), "find");
        index.find(txn, pattern)
    }
}
