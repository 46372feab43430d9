//! `Transaction` and the `TrxKit` that mints them. Wraps
//! `RecordFile::{insert_record,delete_record,get_record}` with
//! hidden-column stamping, visibility filtering, and the MVCC WAL trail,
//! so callers above the record manager never see the hidden columns
//! directly.
//!
//! Grounded on `src/transaction/tx.rs`'s `Transaction::{new,commit,
//! abort}` lifecycle, re-targeted from 2PL release-latches-on-commit to
//! MVCC stamp-rewrite-on-commit.

use crate::buffer_pool::DurabilityHook;
use crate::error::{StorageError, StorageResult};
use crate::page::PoolId;
use crate::record::file::RecordFile;
use crate::record::rid::Rid;
use crate::txn::log::TxnLogEntry;
use crate::txn::mvcc;
use crate::wal::manager::LogManager;
use crate::wal::ModuleId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering::SeqCst};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
}

/// Read/write permission requested by `visit_record` — kept even though
/// the MVCC design needs no lock table for it, so a future stricter
/// isolation level has somewhere to plug in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

struct Undo {
    pool_id: PoolId,
    rid: Rid,
    /// `None` for an insert this transaction performed (undo = delete);
    /// `Some(bytes)` for a delete this transaction performed (undo =
    /// restore those exact bytes).
    predelete_bytes: Option<Vec<u8>>,
}

/// Mints transactions off one shared monotonic counter, so that ids and
/// commit stamps interleave and a commit stamp is always greater than
/// any transaction id active when it was minted.
pub struct TrxKit {
    counter: AtomicI32,
    log: Arc<LogManager>,
}

impl TrxKit {
    pub fn new(log: Arc<LogManager>) -> Arc<Self> {
        Arc::new(TrxKit { counter: AtomicI32::new(1), log })
    }

    /// Recovery-only: seeds the counter past the highest id seen in the
    /// log, so newly created transactions never collide with a replayed
    /// one.
    pub fn fast_forward(&self, past: i32) {
        let mut cur = self.counter.load(SeqCst);
        while cur <= past {
            match self.counter.compare_exchange(cur, past + 1, SeqCst, SeqCst) {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }
    }

    pub fn create_trx(self: &Arc<Self>) -> Arc<Transaction> {
        let id = self.counter.fetch_add(1, SeqCst);
        Arc::new(Transaction::new(id, Arc::clone(&self.log), Arc::clone(self)))
    }

    /// Re-creates a transaction handle for a given id during recovery's
    /// rollback-of-incomplete-transactions pass, rather than
    /// minting a new one.
    pub fn create_trx_with_id(self: &Arc<Self>, id: i32) -> Arc<Transaction> {
        Arc::new(Transaction::new(id, Arc::clone(&self.log), Arc::clone(self)))
    }

    fn next_commit_stamp(&self) -> i32 {
        self.counter.fetch_add(1, SeqCst)
    }
}

pub struct Transaction {
    id: i32,
    log: Arc<LogManager>,
    kit: Arc<TrxKit>,
    started: AtomicBool,
    status: Mutex<TransactionStatus>,
    undo_log: Mutex<Vec<Undo>>,
}

impl Transaction {
    fn new(id: i32, log: Arc<LogManager>, kit: Arc<TrxKit>) -> Self {
        Transaction {
            id,
            log,
            kit,
            started: AtomicBool::new(false),
            status: Mutex::new(TransactionStatus::Active),
            undo_log: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        *self.status.lock()
    }

    /// Transactions begin lazily. A fresh transaction takes no
    /// WAL space until its first real operation.
    pub fn start_if_need(&self) {
        self.started.store(true, SeqCst);
    }

    pub fn insert_record(&self, table: &Arc<RecordFile>, payload: &[u8]) -> StorageResult<Rid> {
        self.start_if_need();
        let stored = mvcc::encode_row(-self.id, mvcc::NO_END, payload);
        let rid = table.insert_record(&stored)?;
        self.log.append(
            ModuleId::Transaction,
            TxnLogEntry::InsertRecord { trx_id: self.id, pool_id: table.pool_id(), rid }.encode(),
        );
        self.undo_log.lock().push(Undo { pool_id: table.pool_id(), rid, predelete_bytes: None });
        Ok(rid)
    }

    /// A failure midway through `insert_record` unwinds immediately
    /// rather than waiting for an explicit caller-initiated rollback.
    pub fn insert_record_or_rollback(&self, table: &Arc<RecordFile>, payload: &[u8]) -> StorageResult<Rid> {
        match self.insert_record(table, payload) {
            Ok(rid) => Ok(rid),
            Err(e) => {
                self.rollback_internal(&[table.as_ref()]).ok();
                Err(e)
            }
        }
    }

    pub fn delete_record(&self, table: &Arc<RecordFile>, rid: Rid) -> StorageResult<()> {
        self.start_if_need();
        let stored = table.get_record(rid)?;
        let (trx_begin, _trx_end, _payload) = mvcc::decode_row(&stored);
        let mut new_end_stored = stored.clone();
        mvcc::set_trx_end(&mut new_end_stored, -self.id);
        table.update_record(rid, &new_end_stored)?;
        let _ = trx_begin;

        self.log.append(
            ModuleId::Transaction,
            TxnLogEntry::DeleteRecord { trx_id: self.id, pool_id: table.pool_id(), rid, predelete: stored.clone() }.encode(),
        );
        self.undo_log.lock().push(Undo { pool_id: table.pool_id(), rid, predelete_bytes: Some(stored) });
        Ok(())
    }

    /// Returns the caller's own payload (hidden columns stripped) if the
    /// row is visible at this transaction's snapshot, `Ok(None)`
    /// otherwise. `access` is currently advisory.
    pub fn visit_record(&self, table: &Arc<RecordFile>, rid: Rid, _access: Access) -> StorageResult<Option<Vec<u8>>> {
        self.start_if_need();
        let stored = table.get_record(rid)?;
        let (trx_begin, trx_end, payload) = mvcc::decode_row(&stored);
        if mvcc::is_visible(trx_begin, trx_end, self.id, self.id) {
            Ok(Some(payload.to_vec()))
        } else {
            Ok(None)
        }
    }

    pub fn commit(&self, tables: &[&RecordFile]) -> StorageResult<()> {
        let commit_stamp = self.kit.next_commit_stamp();
        for undo in self.undo_log.lock().iter() {
            let table = tables
                .iter()
                .find(|t| t.pool_id() == undo.pool_id)
                .ok_or_else(|| StorageError::Internal("commit: table not supplied".into()))?;
            let mut stored = table.get_record(undo.rid)?;
            let (trx_begin, trx_end, _) = mvcc::decode_row(&stored);
            if trx_begin == -self.id {
                mvcc::set_trx_begin(&mut stored, commit_stamp);
            }
            if trx_end == -self.id {
                mvcc::set_trx_end(&mut stored, commit_stamp);
            }
            table.update_record(undo.rid, &stored)?;
        }

        let lsn = self.log.append(ModuleId::Transaction, TxnLogEntry::Commit { trx_id: self.id, commit_trx_id: commit_stamp }.encode());
        self.log.wait_lsn(lsn);
        *self.status.lock() = TransactionStatus::Committed;
        Ok(())
    }

    pub fn rollback(&self, tables: &[&RecordFile]) -> StorageResult<()> {
        self.rollback_internal(tables)?;
        self.log.append(ModuleId::Transaction, TxnLogEntry::Rollback { trx_id: self.id }.encode());
        Ok(())
    }

    fn rollback_internal(&self, tables: &[&RecordFile]) -> StorageResult<()> {
        let mut undo_log = self.undo_log.lock();
        for undo in undo_log.drain(..).rev() {
            let table = match tables.iter().find(|t| t.pool_id() == undo.pool_id) {
                Some(t) => t,
                None => continue,
            };
            match &undo.predelete_bytes {
                None => {
                    table.delete_record(undo.rid)?;
                }
                Some(bytes) => {
                    table.restore_record(undo.rid, bytes)?;
                }
            }
        }
        *self.status.lock() = TransactionStatus::RolledBack;
        Ok(())
    }
}
