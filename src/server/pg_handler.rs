//! pgwire `SimpleQueryHandler` adapter: translates a wire query string
//! into a call on [`crate::sql::Session`] and shapes the result back into
//! pgwire's response types. Kept deliberately thin — every actual
//! storage operation happens inside the engine, this module only
//! carries bytes across the wire.
//!
//! Grounded on `src/server/pg_handler.rs`'s `PostgresHandler` shape,
//! filled in past its `unimplemented!()` stub since this engine owns a
//! real `Session::execute` to call.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_core::Stream;
use log::info;
use pgwire::api::results::{DataRowEncoder, FieldFormat, FieldInfo, QueryResponse, Response, Tag};
use pgwire::api::{ClientInfo, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::data::DataRow;

use crate::sql::Session;

pub struct PostgresHandler {
    pub session: Arc<Mutex<Session>>,
}

impl PostgresHandler {
    pub fn new(session: Arc<Mutex<Session>>) -> Self {
        Self { session }
    }
}

/// A `Stream` over already-materialized rows. The storage engine has no
/// async boundary of its own, so every row is ready the moment this is
/// built; this only exists to satisfy `QueryResponse`'s streaming shape.
struct RowStream {
    rows: std::vec::IntoIter<PgWireResult<DataRow>>,
}

impl Stream for RowStream {
    type Item = PgWireResult<DataRow>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.rows.next())
    }
}

#[async_trait]
impl pgwire::api::query::SimpleQueryHandler for PostgresHandler {
    async fn do_query<'b, C>(&self, _client: &C, query: &'b str) -> PgWireResult<Vec<Response<'b>>>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        info!("query: {}", query);
        let rows = self
            .session
            .lock()
            .unwrap()
            .execute(query)
            .map_err(|e| PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), "XX000".into(), e.to_string()))))?;

        if query.trim_start().to_uppercase().starts_with("INSERT") {
            return Ok(vec![Response::Execution(Tag::new_for_execution("INSERT", Some(rows.len())))]);
        }

        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let fields: Vec<FieldInfo> = (0..width)
            .map(|i| FieldInfo::new(format!("col{}", i), None, None, Type::TEXT, FieldFormat::Text))
            .collect();
        let field_info = Arc::new(fields);

        let encoded: Vec<PgWireResult<DataRow>> = rows
            .into_iter()
            .map(|row| {
                let mut encoder = DataRowEncoder::new(field_info.clone());
                for value in row {
                    encoder.encode_field(&Some(value))?;
                }
                encoder.finish()
            })
            .collect();

        let stream = RowStream { rows: encoded.into_iter() };
        Ok(vec![Response::Query(QueryResponse::new(field_info, Box::pin(stream)))])
    }
}
