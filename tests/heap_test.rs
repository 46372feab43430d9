mod common;

use common::Harness;
use crate_db::config::StorageConfig;

/// S1 — heap round-trip, including a restart that reopens the same data
/// file without replaying the WAL (page contents already flushed).
#[test]
fn heap_round_trip_survives_restart() {
    common::init_log();
    let harness = Harness::new(&StorageConfig::for_test());
    harness.new_pool(1, "heap.tbl").unwrap();

    let table = harness.record_file(1, 32);
    let mut pad = |s: &str| {
        let mut v = s.as_bytes().to_vec();
        v.resize(32, 0);
        v
    };

    let r1 = table.insert_record(&pad("1,a")).unwrap();
    let r2 = table.insert_record(&pad("2,b")).unwrap();
    let r3 = table.insert_record(&pad("3,c")).unwrap();

    let mut scanner = crate_db::record::RecordFileScanner::new(std::sync::Arc::new(table));
    let mut seen = Vec::new();
    while let Some((rid, _)) = scanner.next_record().unwrap() {
        seen.push(rid);
    }
    assert_eq!(seen, vec![r1, r2, r3]);
    drop(scanner);

    let table = harness.record_file(1, 32);
    table.delete_record(r2).unwrap();

    let mut scanner = crate_db::record::RecordFileScanner::new(std::sync::Arc::new(table));
    let mut seen = Vec::new();
    while let Some((rid, _)) = scanner.next_record().unwrap() {
        seen.push(rid);
    }
    assert_eq!(seen, vec![r1, r3]);
    drop(scanner);

    harness.buffer_pool.flush_all_pages().unwrap();

    let table = harness.record_file(1, 32);
    let mut scanner = crate_db::record::RecordFileScanner::new(std::sync::Arc::new(table));
    let mut seen = Vec::new();
    while let Some((rid, _)) = scanner.next_record().unwrap() {
        seen.push(rid);
    }
    assert_eq!(seen, vec![r1, r3]);
}
