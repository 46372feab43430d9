//! Offline WAL replay: opens a data directory the same way the server
//! does and exits, so an operator can force recovery to run
//! — and see its log output — without also starting the pgwire listener.

use crate_db::config::StorageConfig;
use crate_db::database::{Database, ObjectSpec};
use crate_db::util::init_log;
use log::info;

fn main() {
    init_log();

    let mut args = std::env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| {
        eprintln!("usage: crate-db-recover <data-dir>");
        std::process::exit(1);
    });

    let record_size = crate_db::sql::PAYLOAD_WIDTH + crate_db::txn::mvcc::HIDDEN_COLUMNS_LEN;
    let objects = vec![ObjectSpec::Table { name: "default_table".into(), record_size }];

    let db = Database::open(std::path::Path::new(&dir), StorageConfig::default(), objects).expect("recovery failed");
    info!("recovery complete for {}", dir);
    db.shutdown().expect("shutdown failed");
}
