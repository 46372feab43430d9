use std::convert::TryInto;
mod common;

use common::{key, Harness};
use crate_db::config::StorageConfig;

/// S2 — with a page size small enough to force `leaf_max_size == 4`,
/// five inserts should split the original leaf in two, linked by
/// `next_brother`, with an internal root holding one separator.
#[test]
fn insert_splits_leaf_when_full() {
    common::init_log();
    let mut config = StorageConfig::for_test();
    config.page_size = 112; // (112 - 25) / 20 == 4 for a 4-byte key.
    let harness = Harness::new(&config);
    harness.new_pool(1, "btree.idx").unwrap();
    let tree = harness.btree(1, 4);

    for k in [10, 20, 30, 40, 25] {
        tree.insert_entry(&key(k), crate_db::record::Rid::new(1, k as usize)).unwrap();
    }

    assert!(!tree.root_is_leaf().unwrap(), "root should have split into an internal node");

    for k in [10, 20, 30, 40, 25] {
        let rid = tree.lookup(&key(k)).unwrap();
        assert_eq!(rid, Some(crate_db::record::Rid::new(1, k as usize)));
    }

    let mut scan = crate_db::index::RangeScan::open(&tree, None, None).unwrap();
    let mut seen = Vec::new();
    while let Some((k, _rid)) = scan.next().unwrap() {
        seen.push(i32::from_be_bytes(k.try_into().unwrap()));
    }
    assert_eq!(seen, vec![10, 20, 25, 30, 40]);
}

#[test]
fn insert_rejects_duplicate_key() {
    common::init_log();
    let harness = Harness::new(&StorageConfig::for_test());
    harness.new_pool(1, "btree.idx").unwrap();
    let tree = harness.btree(1, 4);

    tree.insert_entry(&key(1), crate_db::record::Rid::new(1, 0)).unwrap();
    let err = tree.insert_entry(&key(1), crate_db::record::Rid::new(1, 0)).unwrap_err();
    assert!(matches!(err, crate_db::error::StorageError::DuplicateKey));
}
