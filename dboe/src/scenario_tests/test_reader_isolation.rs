//! Readers see the snapshot taken when they began.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::index::Index;
use crate::scenario_tests::helpers::*;
use crate::tuple::DatasetError;
use crate::txn::TxnMode;

#[test]
fn test_reader_ignores_later_commit() {
    let test = TestIndex::new();
    test.insert_committed(&[1, 2, 3]);

    let reader = test.begin(TxnMode::Read);
    assert_eq!(test.keys(&reader), vec![1, 2, 3]);

    std::thread::scope(|s| {
        s.spawn(|| {
            test.coordinator
                .execute_write(|txn| {
                    test.index.insert(txn, record(4, 40))?;
                    test.index.delete(txn, &key(1))?;
                    Ok::<_, DatasetError>(())
                })
                .expect("writer");
        });
    });

    assert_eq!(test.keys(&reader), vec![1, 2, 3]);
    assert_eq!(test.index.find(&reader, &key(4)).expect("find"), None);
    assert!(test.index.contains(&reader, &key(1)).expect("contains"));
    assert_eq!(test.index.size(&reader).expect("size"), 3);

    let later = test.begin(TxnMode::Read);
    assert_eq!(test.keys(&later), vec![2, 3, 4]);
}

#[test]
fn test_concurrent_readers_see_whole_commits() {
    const BATCH: u32 = 10;
    let test = TestIndex::new();
    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        for _ in 0..3 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let reader = test.begin(TxnMode::Read);
                    let keys = test.keys(&reader);
                    assert_eq!(keys.len() as u32 % BATCH, 0, "saw part of a commit");
                    assert_eq!(test.index.size(&reader).expect("size"), keys.len() as u64);
                }
            });
        }

        for batch in 0..40 {
            let keys: Vec<u32> = (batch * BATCH..(batch + 1) * BATCH).collect();
            test.insert_committed(&keys);
        }
        done.store(true, Ordering::Release);
    });

    let reader = test.begin(TxnMode::Read);
    assert_eq!(test.keys(&reader).len(), 400);
    test.index.check(&reader).expect("check");
}
