//! Random keys come back distinct and in order.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::index::Index;
use crate::scenario_tests::helpers::*;
use crate::txn::TxnMode;

#[test]
fn test_random_keys_iterate_sorted_and_distinct() {
    let test = TestIndex::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut model = BTreeMap::new();

    let mut txn = test.begin(TxnMode::Write);
    for _ in 0..2000 {
        let k: u32 = rng.random_range(0..5000);
        let v: u32 = rng.random();
        test.index.insert(&txn, record(k, v)).expect("insert");
        model.insert(k, v);
    }
    txn.commit().expect("commit");
    txn.complete();

    let reader = test.begin(TxnMode::Read);
    let expected: Vec<u32> = model.keys().copied().collect();
    assert_eq!(test.keys(&reader), expected);
    assert_eq!(test.index.size(&reader).expect("size"), model.len() as u64);

    for (k, v) in model.iter().step_by(97) {
        let found = test.index.find(&reader, &key(*k)).expect("find").expect("present");
        assert_eq!(decode_value(&found), *v);
    }
    let min = test.index.min_key(&reader).expect("min").expect("non-empty");
    let max = test.index.max_key(&reader).expect("max").expect("non-empty");
    assert_eq!(Some(&decode_key(&min)), model.keys().next());
    assert_eq!(Some(&decode_key(&max)), model.keys().next_back());
}

#[test]
fn test_keys_compare_as_unsigned_bytes() {
    let test = TestIndex::new();
    test.insert_committed(&[0x8000_0000, 0x7fff_ffff, 1, u32::MAX, 0]);

    let reader = test.begin(TxnMode::Read);
    assert_eq!(
        test.keys(&reader),
        vec![0, 1, 0x7fff_ffff, 0x8000_0000, u32::MAX]
    );
    assert_eq!(test.range(&reader, 0x7fff_ffff, u32::MAX), vec![0x7fff_ffff, 0x8000_0000]);

    let found = test
        .index
        .find(&reader, &key(u32::MAX))
        .expect("find")
        .expect("present");
    assert_eq!(decode_value(&found), u32::MAX.wrapping_mul(10));
}
