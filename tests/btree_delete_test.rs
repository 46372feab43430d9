use std::convert::TryInto;
mod common;

use common::{key, Harness};
use crate_db::config::StorageConfig;
use crate_db::record::Rid;

/// S3 — continuing from a split tree, deleting enough entries should
/// coalesce the two leaves back into one and collapse the internal root.
#[test]
fn delete_coalesces_and_collapses_root() {
    common::init_log();
    let mut config = StorageConfig::for_test();
    config.page_size = 112;
    let harness = Harness::new(&config);
    harness.new_pool(1, "btree.idx").unwrap();
    let tree = harness.btree(1, 4);

    for k in [10, 20, 30, 40, 25] {
        tree.insert_entry(&key(k), Rid::new(1, k as usize)).unwrap();
    }
    assert!(!tree.root_is_leaf().unwrap());

    tree.delete_entry(&key(40), Rid::new(1, 40)).unwrap();

    assert!(tree.root_is_leaf().unwrap(), "root should collapse back to a single leaf");
    assert_eq!(tree.lookup(&key(40)).unwrap(), None);

    let mut scan = crate_db::index::RangeScan::open(&tree, None, None).unwrap();
    let mut seen = Vec::new();
    while let Some((k, _rid)) = scan.next().unwrap() {
        seen.push(i32::from_be_bytes(k.try_into().unwrap()));
    }
    assert_eq!(seen, vec![10, 20, 25, 30]);
}

#[test]
fn delete_then_insert_then_delete_empties_tree() {
    common::init_log();
    let harness = Harness::new(&StorageConfig::for_test());
    harness.new_pool(1, "btree.idx").unwrap();
    let tree = harness.btree(1, 4);

    let keys: Vec<i32> = (0..50).collect();
    for &k in &keys {
        tree.insert_entry(&key(k), Rid::new(1, k as usize)).unwrap();
    }
    for &k in &keys {
        assert_eq!(tree.lookup(&key(k)).unwrap(), Some(Rid::new(1, k as usize)));
    }
    for &k in keys.iter().rev() {
        tree.delete_entry(&key(k), Rid::new(1, k as usize)).unwrap();
    }
    for &k in &keys {
        assert_eq!(tree.lookup(&key(k)).unwrap(), None);
    }
    assert!(tree.root_is_leaf().unwrap());
}

#[test]
fn delete_missing_key_errors() {
    common::init_log();
    let harness = Harness::new(&StorageConfig::for_test());
    harness.new_pool(1, "btree.idx").unwrap();
    let tree = harness.btree(1, 4);

    let err = tree.delete_entry(&key(7), Rid::new(1, 7)).unwrap_err();
    assert!(matches!(err, crate_db::error::StorageError::RecordNotExist));
}
