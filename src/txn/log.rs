//! MVCC's own WAL payload shape: `INSERT_RECORD`,
//! `DELETE_RECORD`, `COMMIT`, `ROLLBACK`. These ride under
//! [`ModuleId::Transaction`](crate::wal::ModuleId::Transaction), separate
//! from the record manager's own physical log, so the integrated
//! replayer's MVCC stage can reconstruct which rows belong to which
//! transaction without re-parsing heap operations.
//!
//! Grounded on `src/transaction/log_aries.rs`'s START/COMMIT/ABORT tags,
//! widened with a `table_id + rid` operand on INSERT and DELETE.
//!
//! `DeleteRecord` carries the row's pre-delete bytes inline rather than
//! leaning on the record manager's own log: an MVCC delete is a visibility
//! stamp (`update_record` setting `trx_end`), never a
//! `RecordOp::Delete`, so recovery's undo-of-incomplete-transactions pass
//! has nowhere else to recover that pre-image from.

use std::convert::TryInto;
use crate::page::PoolId;
use crate::record::rid::Rid;

#[derive(Debug, Clone)]
pub enum TxnLogEntry {
    InsertRecord { trx_id: i32, pool_id: PoolId, rid: Rid },
    DeleteRecord { trx_id: i32, pool_id: PoolId, rid: Rid, predelete: Vec<u8> },
    Commit { trx_id: i32, commit_trx_id: i32 },
    Rollback { trx_id: i32 },
}

const TAG_INSERT: u8 = 0;
const TAG_DELETE: u8 = 1;
const TAG_COMMIT: u8 = 2;
const TAG_ROLLBACK: u8 = 3;

impl TxnLogEntry {
    pub fn trx_id(&self) -> i32 {
        match self {
            TxnLogEntry::InsertRecord { trx_id, .. }
            | TxnLogEntry::DeleteRecord { trx_id, .. }
            | TxnLogEntry::Commit { trx_id, .. }
            | TxnLogEntry::Rollback { trx_id } => *trx_id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            TxnLogEntry::InsertRecord { trx_id, pool_id, rid } => {
                buf.push(TAG_INSERT);
                buf.extend_from_slice(&trx_id.to_be_bytes());
                buf.extend_from_slice(&pool_id.to_be_bytes());
                buf.extend_from_slice(&rid.encode());
            }
            TxnLogEntry::DeleteRecord { trx_id, pool_id, rid, predelete } => {
                buf.push(TAG_DELETE);
                buf.extend_from_slice(&trx_id.to_be_bytes());
                buf.extend_from_slice(&pool_id.to_be_bytes());
                buf.extend_from_slice(&rid.encode());
                buf.extend_from_slice(predelete);
            }
            TxnLogEntry::Commit { trx_id, commit_trx_id } => {
                buf.push(TAG_COMMIT);
                buf.extend_from_slice(&trx_id.to_be_bytes());
                buf.extend_from_slice(&commit_trx_id.to_be_bytes());
            }
            TxnLogEntry::Rollback { trx_id } => {
                buf.push(TAG_ROLLBACK);
                buf.extend_from_slice(&trx_id.to_be_bytes());
            }
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.is_empty() {
            return None;
        }
        let tag = buf[0];
        let trx_id = i32::from_be_bytes(buf[1..5].try_into().ok()?);
        Some(match tag {
            TAG_INSERT => {
                let pool_id = PoolId::from_be_bytes(buf[5..9].try_into().ok()?);
                let rid = Rid::decode(&buf[9..9 + Rid::ENCODED_LEN]);
                TxnLogEntry::InsertRecord { trx_id, pool_id, rid }
            }
            TAG_DELETE => {
                let pool_id = PoolId::from_be_bytes(buf[5..9].try_into().ok()?);
                let rid_end = 9 + Rid::ENCODED_LEN;
                let rid = Rid::decode(&buf[9..rid_end]);
                let predelete = buf[rid_end..].to_vec();
                TxnLogEntry::DeleteRecord { trx_id, pool_id, rid, predelete }
            }
            TAG_COMMIT => {
                let commit_trx_id = i32::from_be_bytes(buf[5..9].try_into().ok()?);
                TxnLogEntry::Commit { trx_id, commit_trx_id }
            }
            TAG_ROLLBACK => TxnLogEntry::Rollback { trx_id },
            _ => return None,
        })
    }
}
