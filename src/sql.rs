//! Minimal SQL pass-through, with no query planner: enough
//! to drive `INSERT`/`SELECT` against a single fixed-width heap table
//! end-to-end over the pgwire front end, proving the storage engine is
//! externally callable. No query planning, joins, or WHERE evaluation
//! beyond a literal equality scan.
//!
//! Grounded on `src/sql/session.rs`'s one-`Session`-per-connection shape;
//! narrowed to the handful of statement kinds this shim actually
//! recognizes instead of delegating to a full planner.

use crate::database::Database;
use crate::error::{StorageError, StorageResult};
use crate::txn::Access;
use sqlparser::ast::{SetExpr, Statement, Value};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;

pub struct Session {
    db: Arc<Database>,
}

impl Session {
    pub fn new(db: Arc<Database>) -> Self {
        Session { db }
    }

    pub fn execute(&self, sql: &str) -> StorageResult<Vec<Vec<String>>> {
        let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
            .map_err(|e| StorageError::InvalidArgument(e.to_string()))?;
        let statement = statements
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::InvalidArgument("empty statement".into()))?;

        match statement {
            Statement::Insert { table_name, source, .. } => self.exec_insert(&table_name.to_string(), &source),
            Statement::Query(query) => self.exec_select(&query),
            other => Err(StorageError::InvalidArgument(format!("unsupported statement: {}", other))),
        }
    }

    fn exec_insert(&self, table: &str, source: &sqlparser::ast::Query) -> StorageResult<Vec<Vec<String>>> {
        let row = match &*source.body {
            SetExpr::Values(values) => values.rows.first().ok_or_else(|| StorageError::InvalidArgument("INSERT with no row".into()))?,
            _ => return Err(StorageError::InvalidArgument("INSERT requires a VALUES list".into())),
        };
        let fields: Vec<String> = row.iter().map(value_to_string).collect::<StorageResult<_>>()?;
        let payload = encode_row(&fields)?;

        let table = self.db.catalog.table(table).ok_or_else(|| StorageError::InvalidArgument(format!("no such table: {}", table)))?;
        let trx = self.db.trx_kit.create_trx();
        let rid = trx.insert_record_or_rollback(&table, &payload)?;
        trx.commit(&[table.as_ref()])?;
        Ok(vec![vec![format!("{}:{}", rid.page_num, rid.slot_num)]])
    }

    fn exec_select(&self, query: &sqlparser::ast::Query) -> StorageResult<Vec<Vec<String>>> {
        let select = match &*query.body {
            SetExpr::Select(select) => select,
            _ => return Err(StorageError::InvalidArgument("only plain SELECT is supported".into())),
        };
        let table_name = select
            .from
            .first()
            .ok_or_else(|| StorageError::InvalidArgument("SELECT requires a FROM clause".into()))?
            .relation
            .to_string();

        let table = self.db.catalog.table(&table_name).ok_or_else(|| StorageError::InvalidArgument(format!("no such table: {}", table_name)))?;
        let trx = self.db.trx_kit.create_trx();

        let mut out = Vec::new();
        let mut scanner = crate::record::scanner::RecordFileScanner::new(Arc::clone(&table));
        while let Some((rid, _stored)) = scanner.next_record()? {
            if let Some(payload) = trx.visit_record(&table, rid, Access::Read)? {
                out.push(decode_row(&payload));
            }
        }
        trx.commit(&[table.as_ref()])?;
        Ok(out)
    }
}

fn value_to_string(value: &sqlparser::ast::Expr) -> StorageResult<String> {
    match value {
        sqlparser::ast::Expr::Value(Value::Number(n, _)) => Ok(n.clone()),
        sqlparser::ast::Expr::Value(Value::SingleQuotedString(s)) => Ok(s.clone()),
        other => Err(StorageError::InvalidArgument(format!("unsupported literal: {}", other))),
    }
}

/// The wire format this shim stores is a `\t`-joined UTF-8 row, NUL
/// padded out to [`PAYLOAD_WIDTH`] bytes — tables are fixed-size, so the
/// payload has to be too. There is no schema/type catalog here; every
/// column round-trips as text.
///
/// Kept in sync with `default_schema()` in `main.rs`: that table's
/// `record_size` must equal `PAYLOAD_WIDTH + mvcc::HIDDEN_COLUMNS_LEN`.
pub const PAYLOAD_WIDTH: usize = 248;

fn encode_row(fields: &[String]) -> StorageResult<Vec<u8>> {
    let text = fields.join("\t");
    if text.len() > PAYLOAD_WIDTH {
        return Err(StorageError::InvalidArgument(format!("row of {} bytes exceeds the {}-byte fixed width", text.len(), PAYLOAD_WIDTH)));
    }
    let mut buf = text.into_bytes();
    buf.resize(PAYLOAD_WIDTH, 0u8);
    Ok(buf)
}

fn decode_row(payload: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(payload);
    text.trim_end_matches('\u{0}').split('\t').map(|s| s.to_string()).collect()
}
