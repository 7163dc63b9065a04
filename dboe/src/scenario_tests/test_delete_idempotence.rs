//! Deleting an absent key is a no-op.

use crate::index::Index;
use crate::scenario_tests::helpers::*;
use crate::txn::TxnMode;

#[test]
fn test_delete_absent_key_changes_nothing() {
    let test = TestIndex::new();
    let keys: Vec<u32> = (0..300).map(|k| k * 2).collect();
    test.insert_committed(&keys);

    let txn = test.begin(TxnMode::Write);
    let before = test.keys(&txn);
    for absent in [1, 299, 601, 10_000] {
        assert!(!test.index.delete(&txn, &key(absent)).expect("delete"));
        test.index.check(&txn).expect("check");
        assert_eq!(test.index.size(&txn).expect("size"), 300);
    }
    assert_eq!(test.keys(&txn), before);
}

#[test]
fn test_second_delete_returns_false() {
    let test = TestIndex::new();
    test.insert_committed(&[7]);

    let txn = test.begin(TxnMode::Write);
    assert!(test.index.delete(&txn, &key(7)).expect("first delete"));
    assert!(!test.index.delete(&txn, &key(7)).expect("second delete"));
    assert!(test.index.is_empty(&txn).expect("is_empty"));
}

#[test]
fn test_delete_on_empty_index() {
    let test = TestIndex::new();
    let txn = test.begin(TxnMode::Write);
    assert!(!test.index.delete(&txn, &key(0)).expect("delete"));
    test.index.check(&txn).expect("check");
}
