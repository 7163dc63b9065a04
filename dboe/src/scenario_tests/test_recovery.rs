//! Restart after a crash between prepare and commit.

use std::fs::OpenOptions;

use crate::config::DatasetConfig;
use crate::index::Index;
use crate::scenario_tests::helpers::*;
use crate::tuple::{JOURNAL_FILE, TripleTable};
use crate::txn::TxnMode;

#[test]
fn test_prepared_transaction_rolls_forward() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let (test, recovery) = TestIndex::open(dir.path());
        assert_eq!(recovery.entries_scanned, 0);
        test.insert_committed(&[1, 2, 3]);

        let mut txn = test.begin(TxnMode::Write);
        for k in 100..400 {
            test.index.insert(&txn, record(k, k)).expect("insert");
        }
        assert!(test.index.delete(&txn, &key(2)).expect("delete"));
        txn.prepare().expect("prepare");
        txn.crash();
    }

    let (test, recovery) = TestIndex::open(dir.path());
    assert_eq!(recovery.transactions_replayed, 1);
    assert!(recovery.blocks_replayed > 0);

    let reader = test.begin(TxnMode::Read);
    let mut expected = vec![1, 3];
    expected.extend(100..400);
    assert_eq!(test.keys(&reader), expected);
    test.index.check(&reader).expect("check");
    drop(reader);

    // The journal was truncated by recovery.
    drop(test);
    let (_, recovery) = TestIndex::open(dir.path());
    assert_eq!(recovery.entries_scanned, 0);
}

#[test]
fn test_unprepared_transaction_is_lost() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let (test, _) = TestIndex::open(dir.path());
        test.insert_committed(&[1, 2, 3]);
        let txn = test.begin(TxnMode::Write);
        test.index.insert(&txn, record(50, 50)).expect("insert");
        txn.crash();
    }

    let (test, recovery) = TestIndex::open(dir.path());
    assert_eq!(recovery.transactions_replayed, 0);
    let reader = test.begin(TxnMode::Read);
    assert_eq!(test.keys(&reader), vec![1, 2, 3]);
}

#[test]
fn test_torn_commit_marker_discards_transaction() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let (test, _) = TestIndex::open(dir.path());
        test.insert_committed(&[1, 2, 3]);
        let mut txn = test.begin(TxnMode::Write);
        test.index.insert(&txn, record(60, 60)).expect("insert");
        txn.prepare().expect("prepare");
        txn.crash();
    }

    let journal_path = dir.path().join("journal.jrnl");
    let len = std::fs::metadata(&journal_path).expect("journal metadata").len();
    OpenOptions::new()
        .write(true)
        .open(&journal_path)
        .expect("open journal")
        .set_len(len - 3)
        .expect("truncate");

    let (test, recovery) = TestIndex::open(dir.path());
    assert_eq!(recovery.transactions_replayed, 0);
    assert_eq!(recovery.transactions_discarded, 1);
    assert!(recovery.torn_bytes > 0);
    let reader = test.begin(TxnMode::Read);
    assert_eq!(test.keys(&reader), vec![1, 2, 3]);
}

#[test]
fn test_triple_table_rolls_forward_every_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = DatasetConfig::new(dir.path().join("dataset"));
    config.block_size = 512;

    {
        let (table, _) = TripleTable::open(&config).expect("open");
        let mut txn = table.begin(TxnMode::Write).expect("begin");
        for s in 0..50 {
            table.add(&txn, [s, 1000 + s % 5, 2000 + s % 3]).expect("add");
        }
        txn.prepare().expect("prepare");
        txn.crash();
    }
    assert!(config.directory.join(JOURNAL_FILE).exists());

    let (table, recovery) = TripleTable::open(&config).expect("reopen");
    assert_eq!(recovery.transactions_replayed, 1);

    let reader = table.begin(TxnMode::Read).expect("begin read");
    for index in table.indexes() {
        assert_eq!(index.size(&reader).expect("size"), 50, "{}", index.name());
        assert!(index.contains(&reader, &[7, 1002, 2001]).expect("contains"));
    }
    table.check(&reader).expect("check");
}
