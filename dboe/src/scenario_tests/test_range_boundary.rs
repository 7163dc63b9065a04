//! Range scans include the lower bound and exclude the upper.

use crate::index::Index;
use crate::scenario_tests::helpers::*;
use crate::txn::TxnMode;

#[test]
fn test_odd_keys_three_to_seven() {
    let test = TestIndex::new();
    test.insert_committed(&[1, 3, 5, 7, 9]);

    let reader = test.begin(TxnMode::Read);
    assert_eq!(test.range(&reader, 3, 7), vec![3, 5]);
    assert_eq!(test.range(&reader, 2, 8), vec![3, 5, 7]);
    assert_eq!(test.range(&reader, 4, 5), Vec::<u32>::new());
    assert_eq!(test.range(&reader, 9, 9), Vec::<u32>::new());
    assert_eq!(test.range(&reader, 7, 3), Vec::<u32>::new());
}

#[test]
fn test_open_bounds() {
    let test = TestIndex::new();
    test.insert_committed(&[1, 3, 5, 7, 9]);

    let reader = test.begin(TxnMode::Read);
    let below: Vec<u32> = test
        .index
        .iter_range_mapped(&reader, None, Some(&key(5)), |r| decode_key(&r))
        .expect("iter")
        .collect::<Result<_, _>>()
        .expect("scan");
    assert_eq!(below, vec![1, 3]);

    let above: Vec<u32> = test
        .index
        .iter_range_mapped(&reader, Some(&key(5)), None, |r| decode_key(&r))
        .expect("iter")
        .collect::<Result<_, _>>()
        .expect("scan");
    assert_eq!(above, vec![5, 7, 9]);
}

#[test]
fn test_range_across_many_leaves() {
    let test = TestIndex::new();
    let keys: Vec<u32> = (0..1000).collect();
    test.insert_committed(&keys);

    let reader = test.begin(TxnMode::Read);
    assert_eq!(test.range(&reader, 250, 750), (250..750).collect::<Vec<u32>>());
}
