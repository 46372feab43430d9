mod common;

use common::Harness;
use crate_db::config::StorageConfig;
use crate_db::txn::transaction::TrxKit;
use crate_db::txn::Access;
use std::sync::Arc;

const RECORD_SIZE: usize = 8 + 8;

/// S5 — a row committed by one transaction is invisible to a reader
/// whose snapshot predates the commit, and visible to one that starts
/// after it.
#[test]
fn committed_row_respects_snapshot_order() {
    common::init_log();
    let harness = Harness::new(&StorageConfig::for_test());
    harness.new_pool(1, "heap.tbl").unwrap();
    let table = Arc::new(harness.record_file(1, RECORD_SIZE));
    let trx_kit = TrxKit::new(Arc::clone(&harness.log));

    let trx_a = trx_kit.create_trx();
    let rid = trx_a.insert_record_or_rollback(&table, &[1u8; 8]).unwrap();

    let trx_b = trx_kit.create_trx(); // minted before A's commit stamp
    trx_a.commit(&[table.as_ref()]).unwrap();
    let trx_c = trx_kit.create_trx(); // minted after A's commit stamp

    assert_eq!(trx_b.visit_record(&table, rid, Access::Read).unwrap(), None);
    assert_eq!(trx_c.visit_record(&table, rid, Access::Read).unwrap(), Some(vec![1u8; 8]));
}

/// A transaction that inserts and then rolls back leaves the row
/// invisible to everyone, including a transaction started afterward.
#[test]
fn rolled_back_insert_is_never_visible() {
    common::init_log();
    let harness = Harness::new(&StorageConfig::for_test());
    harness.new_pool(1, "heap.tbl").unwrap();
    let table = Arc::new(harness.record_file(1, RECORD_SIZE));
    let trx_kit = TrxKit::new(Arc::clone(&harness.log));

    let trx_a = trx_kit.create_trx();
    let rid = trx_a.insert_record_or_rollback(&table, &[2u8; 8]).unwrap();
    trx_a.rollback(&[table.as_ref()]).unwrap();

    let trx_b = trx_kit.create_trx();
    assert!(trx_b.visit_record(&table, rid, Access::Read).is_err(), "the slot was physically cleared on rollback");
}

/// A transaction's own uncommitted write is visible to itself.
#[test]
fn own_uncommitted_write_is_self_visible() {
    common::init_log();
    let harness = Harness::new(&StorageConfig::for_test());
    harness.new_pool(1, "heap.tbl").unwrap();
    let table = Arc::new(harness.record_file(1, RECORD_SIZE));
    let trx_kit = TrxKit::new(Arc::clone(&harness.log));

    let trx_a = trx_kit.create_trx();
    let rid = trx_a.insert_record_or_rollback(&table, &[3u8; 8]).unwrap();
    assert_eq!(trx_a.visit_record(&table, rid, Access::Read).unwrap(), Some(vec![3u8; 8]));
}
