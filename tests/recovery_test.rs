mod common;

use common::Harness;
use crate_db::config::StorageConfig;
use crate_db::record::file::RecordFile;
use crate_db::recovery::Recovery;
use crate_db::txn::transaction::TrxKit;
use std::collections::HashMap;
use std::sync::Arc;

const RECORD_SIZE: usize = 16 + 8;

fn payload(n: u8) -> Vec<u8> {
    let mut v = vec![n; 16];
    v[0] = n;
    v
}

/// S4 — a committed transaction's WAL trail survives a crash that drops
/// every in-memory page before it is flushed; recovery redoes the
/// inserts so a fresh reader sees them.
#[test]
fn committed_transaction_survives_crash_before_flush() {
    common::init_log();
    let config = StorageConfig::for_test();
    let harness = Harness::new(&config);
    harness.new_pool(1, "heap.tbl").unwrap();

    let rid = {
        let table = Arc::new(harness.record_file(1, RECORD_SIZE));
        let trx_kit = TrxKit::new(Arc::clone(&harness.log));
        let trx = trx_kit.create_trx();
        let rid = trx.insert_record_or_rollback(&table, &payload(7)).unwrap();
        trx.commit(&[table.as_ref()]).unwrap();
        rid
    };
    // No `flush_all_pages` call: the inserted page only exists in the
    // first session's now-discarded in-memory frame.

    let (buffer_pool, log) = common::reopen(harness.dir.path(), &config);
    let table = Arc::new(RecordFile::new(1, RECORD_SIZE, Arc::clone(&buffer_pool), Arc::clone(&log)));
    let mut record_files = HashMap::new();
    record_files.insert(1u32, Arc::clone(&table));
    let trx_kit = TrxKit::new(Arc::clone(&log));

    let recovery = Recovery { buffer_pool, log, record_files, btrees: HashMap::new(), trx_kit: Arc::clone(&trx_kit) };
    recovery.run().unwrap();

    let stored = table.get_record(rid).unwrap();
    let (_begin, _end, restored_payload) = crate_db::txn::mvcc::decode_row(&stored);
    assert_eq!(restored_payload, payload(7).as_slice());
}

/// S6 — a transaction that never commits leaves no trace once recovery's
/// undo-of-incomplete-transactions pass runs.
#[test]
fn uncommitted_transaction_rolled_back_on_restart() {
    common::init_log();
    let config = StorageConfig::for_test();
    let harness = Harness::new(&config);
    harness.new_pool(1, "heap.tbl").unwrap();

    let rid = {
        let table = Arc::new(harness.record_file(1, RECORD_SIZE));
        let trx_kit = TrxKit::new(Arc::clone(&harness.log));
        let trx = trx_kit.create_trx();
        let rid = trx.insert_record_or_rollback(&table, &payload(9)).unwrap();
        // Deliberately no commit() call: the transaction's log trail
        // ends mid-flight, as if the process died here.
        rid
    };

    let (buffer_pool, log) = common::reopen(harness.dir.path(), &config);
    let table = Arc::new(RecordFile::new(1, RECORD_SIZE, Arc::clone(&buffer_pool), Arc::clone(&log)));
    let mut record_files = HashMap::new();
    record_files.insert(1u32, Arc::clone(&table));
    let trx_kit = TrxKit::new(Arc::clone(&log));

    let recovery = Recovery { buffer_pool, log, record_files, btrees: HashMap::new(), trx_kit: Arc::clone(&trx_kit) };
    recovery.run().unwrap();

    let mut scanner = crate_db::record::RecordFileScanner::new(Arc::clone(&table));
    let mut seen = 0;
    while scanner.next_record().unwrap().is_some() {
        seen += 1;
    }
    assert_eq!(seen, 0, "the uncommitted insert should have been undone");
    let _ = rid;
}
