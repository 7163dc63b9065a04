//! Commit publishes a transaction's writes; abort discards them.

use crate::index::Index;
use crate::scenario_tests::helpers::*;
use crate::txn::{TxnMode, TxnState};

#[test]
fn test_abort_hides_insert() {
    let test = TestIndex::new();

    let mut txn = test.begin(TxnMode::Write);
    test.index.insert(&txn, record(42, 1)).expect("insert");
    assert!(test.index.contains(&txn, &key(42)).expect("own write"));
    txn.abort().expect("abort");
    txn.complete();

    let reader = test.begin(TxnMode::Read);
    assert_eq!(test.index.find(&reader, &key(42)).expect("find"), None);
}

#[test]
fn test_commit_shows_insert() {
    let test = TestIndex::new();

    let mut txn = test.begin(TxnMode::Write);
    test.index.insert(&txn, record(42, 1)).expect("insert");
    txn.commit().expect("commit");
    assert_eq!(txn.state(), TxnState::Committed);
    txn.complete();

    let reader = test.begin(TxnMode::Read);
    let found = test.index.find(&reader, &key(42)).expect("find").expect("committed");
    assert_eq!(decode_value(&found), 1);
}

#[test]
fn test_dropped_transaction_aborts() {
    let test = TestIndex::new();
    {
        let txn = test.begin(TxnMode::Write);
        test.index.insert(&txn, record(42, 1)).expect("insert");
    }

    let reader = test.begin(TxnMode::Read);
    assert!(!test.index.contains(&reader, &key(42)).expect("contains"));
    assert_eq!(test.coordinator.stats().aborted, 1);
}

#[test]
fn test_abort_after_prepare_discards() {
    let test = TestIndex::new();

    let mut txn = test.begin(TxnMode::Write);
    test.index.insert(&txn, record(42, 1)).expect("insert");
    txn.prepare().expect("prepare");
    txn.abort().expect("abort");
    txn.complete();

    let reader = test.begin(TxnMode::Read);
    assert!(!test.index.contains(&reader, &key(42)).expect("contains"));
}
