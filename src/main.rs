use std::sync::{Arc, Mutex};

use log::info;
use pgwire::{
    api::{
        auth::noop::NoopStartupHandler, query::PlaceholderExtendedQueryHandler, MakeHandler,
        StatelessMakeHandler,
    },
    tokio::process_socket,
};
use crate_db::config::StorageConfig;
use crate_db::database::{Database, ObjectSpec};
use crate_db::server::pg_handler::PostgresHandler;
use crate_db::sql::Session;
use crate_db::util::init_log;
use tokio::net::TcpListener;

/// Connect to the server with
/// `psql -h localhost -p 5432 -d default_db -U xiaochen`
#[tokio::main]
pub async fn main() {
    init_log();

    let dir = std::env::var("CRATE_DB_DIR").unwrap_or_else(|_| "./crate_db_data".into());
    let db = Database::open(std::path::Path::new(&dir), StorageConfig::default(), default_schema())
        .expect("failed to open database");

    let session = Arc::new(Mutex::new(Session::new(db)));
    let pg_handler = PostgresHandler::new(session);

    let processor = Arc::new(StatelessMakeHandler::new(Arc::new(pg_handler)));
    // Extended query protocol is out of scope for this shim; pgwire
    // requires some handler to be wired in regardless.
    let placeholder = Arc::new(StatelessMakeHandler::new(Arc::new(
        PlaceholderExtendedQueryHandler,
    )));
    let authenticator = Arc::new(StatelessMakeHandler::new(Arc::new(NoopStartupHandler)));

    let server_addr = "127.0.0.1:5432";
    let listener = TcpListener::bind(server_addr).await.unwrap();
    info!("listening on {}", server_addr);
    loop {
        let incoming_socket = listener.accept().await.unwrap();
        let authenticator_ref = authenticator.make();
        let processor_ref = processor.make();
        let placeholder_ref = placeholder.make();
        tokio::spawn(async move {
            process_socket(
                incoming_socket.0,
                None,
                authenticator_ref,
                processor_ref,
                placeholder_ref,
            )
            .await
        });
    }
}

/// Demo schema until this shim grows a `CREATE TABLE` statement: one
/// fixed-width table, wide enough for a handful of tab-separated text
/// columns. `record_size` must track `sql::PAYLOAD_WIDTH +
/// mvcc::HIDDEN_COLUMNS_LEN`.
fn default_schema() -> Vec<ObjectSpec> {
    let record_size = crate_db::sql::PAYLOAD_WIDTH + crate_db::txn::mvcc::HIDDEN_COLUMNS_LEN;
    vec![ObjectSpec::Table { name: "default_table".into(), record_size }]
}
