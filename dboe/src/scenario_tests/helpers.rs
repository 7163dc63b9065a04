//! Common helpers for scenario tests.

use std::path::Path;
use std::sync::Arc;

use crate::config::IndexConfig;
use crate::index::{Index, RangeIndex};
use crate::record::{Record, RecordFactory};
use crate::storage::FileStore;
use crate::tuple::DatasetError;
use crate::txn::{
    Journal, MemoryJournal, RecoveryResult, Transaction, TransactionCoordinator,
    TransactionalComponent, TxnMode,
};

pub const BLOCK_SIZE: usize = 256;

/// A range index of `u32 -> u32` records with its own coordinator.
pub struct TestIndex {
    pub index: Arc<RangeIndex>,
    pub coordinator: TransactionCoordinator,
}

pub fn config() -> IndexConfig {
    IndexConfig::new(4, 4)
        .with_block_size(BLOCK_SIZE)
        .with_cache_blocks(8)
        .with_checking(true)
}

impl TestIndex {
    /// A fresh index held in memory.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let index = RangeIndex::in_memory("scenario", 0, &config()).expect("open index");
        let journal = Journal::open(Box::new(MemoryJournal::new()), true).expect("journal");
        let test = Self::assemble(index, journal);
        test.coordinator.start().expect("start");
        test
    }

    /// Open (or create) the index stored in `dir`, running recovery.
    #[allow(clippy::expect_used)]
    pub fn open(dir: &Path) -> (Self, RecoveryResult) {
        let store = FileStore::open(&dir.join("scenario.idx"), BLOCK_SIZE).expect("store");
        let index = RangeIndex::open("scenario", 0, Box::new(store), &config()).expect("open index");
        let journal = Journal::open_file(&dir.join("journal.jrnl"), true).expect("journal");
        let test = Self::assemble(index, journal);
        let recovery = test.coordinator.start().expect("recovery");
        (test, recovery)
    }

    #[allow(clippy::expect_used)]
    fn assemble(index: RangeIndex, journal: Journal) -> Self {
        let index = Arc::new(index);
        let coordinator = TransactionCoordinator::new(
            journal,
            vec![Arc::clone(&index) as Arc<dyn TransactionalComponent>],
        )
        .expect("coordinator");
        Self { index, coordinator }
    }

    #[allow(clippy::expect_used)]
    pub fn begin(&self, mode: TxnMode) -> Transaction {
        self.coordinator.begin(mode).expect("begin")
    }

    /// Insert each key (value = key * 10, wrapping) in one committed transaction.
    #[allow(clippy::expect_used)]
    pub fn insert_committed(&self, keys: &[u32]) {
        self.coordinator
            .execute_write(|txn| {
                for &k in keys {
                    self.index.insert(txn, record(k, k.wrapping_mul(10)))?;
                }
                Ok::<_, DatasetError>(())
            })
            .expect("insert");
    }

    /// Keys visible to `txn`, in iteration order.
    #[allow(clippy::expect_used)]
    pub fn keys(&self, txn: &Transaction) -> Vec<u32> {
        self.index
            .iter_range_mapped(txn, None, None, |r| decode_key(&r))
            .expect("iter")
            .collect::<Result<_, _>>()
            .expect("scan")
    }

    /// Keys in `[min, max)` visible to `txn`.
    #[allow(clippy::expect_used)]
    pub fn range(&self, txn: &Transaction, min: u32, max: u32) -> Vec<u32> {
        self.index
            .iter_range_mapped(txn, Some(&key(min)), Some(&key(max)), |r| decode_key(&r))
            .expect("iter")
            .collect::<Result<_, _>>()
            .expect("scan")
    }
}

pub fn factory() -> RecordFactory {
    RecordFactory::new(4, 4)
}

#[allow(clippy::expect_used)]
pub fn record(k: u32, v: u32) -> Record {
    factory()
        .create_from_parts(&k.to_be_bytes(), &v.to_be_bytes())
        .expect("record")
}

#[allow(clippy::expect_used)]
pub fn key(k: u32) -> Record {
    factory().create_key(&k.to_be_bytes()).expect("key")
}

pub fn decode_key(record: &Record) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(record.key());
    u32::from_be_bytes(bytes)
}

pub fn decode_value(record: &Record) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(record.value());
    u32::from_be_bytes(bytes)
}
