//! Structural checks pass after every insert and delete.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::index::Index;
use crate::scenario_tests::helpers::*;
use crate::txn::TxnMode;

#[test]
fn test_check_after_every_operation() {
    let test = TestIndex::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut model = BTreeSet::new();

    for round in 0..8 {
        let mut txn = test.begin(TxnMode::Write);
        for _ in 0..150 {
            let k = rng.random_range(0..400u32);
            if rng.random_bool(0.6) {
                test.index.insert(&txn, record(k, k)).expect("insert");
                model.insert(k);
            } else {
                let removed = test.index.delete(&txn, &key(k)).expect("delete");
                assert_eq!(removed, model.remove(&k), "round {round}, key {k}");
            }
            test.index.check(&txn).expect("check inside transaction");
            assert_eq!(test.index.size(&txn).expect("size"), model.len() as u64);
        }
        txn.commit().expect("commit");
        txn.complete();

        let reader = test.begin(TxnMode::Read);
        test.index.check(&reader).expect("check after commit");
    }
}

#[test]
fn test_delete_everything_collapses_tree() {
    let test = TestIndex::new();
    let keys: Vec<u32> = (0..600).collect();
    test.insert_committed(&keys);

    let mut txn = test.begin(TxnMode::Write);
    for k in keys.iter().rev() {
        assert!(test.index.delete(&txn, &key(*k)).expect("delete"));
    }
    test.index.check(&txn).expect("check");
    assert!(test.index.is_empty(&txn).expect("is_empty"));
    assert_eq!(test.index.min_key(&txn).expect("min"), None);
    txn.commit().expect("commit");
    txn.complete();

    // The emptied tree accepts new records again.
    test.insert_committed(&[5, 1, 3]);
    let reader = test.begin(TxnMode::Read);
    assert_eq!(test.keys(&reader), vec![1, 3, 5]);
}
