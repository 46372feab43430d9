//! A heap file: pages of fixed-size slotted records, plus the
//! `free_pages` set insert uses to avoid scanning the whole file for
//! room.
//!
//! Locking order is the load-bearing part of this module: **insert**
//! takes the pool-wide `free_pages` lock before the per-page latch, and
//! releases `free_pages` before acquiring the page latch; **delete**
//! takes the page latch first, then re-acquires `free_pages` to add the
//! page back. Reversing either order deadlocks against the other.
//! Grounded on the free-list-then-page-latch discipline
//! `src/btree/table/table.rs`'s `get_empty_page`/insert path uses,
//! generalized here to the plain (non-tree) heap file.

use crate::buffer_pool::BufferPool;
use crate::error::StorageResult;
use crate::page::{PageId, PageNum, PoolId};
use crate::record::log::{RecordLogEntry, RecordOp};
use crate::record::page;
use crate::record::rid::Rid;
use crate::wal::manager::LogManager;
use crate::wal::ModuleId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

pub struct RecordFile {
    pool_id: PoolId,
    record_size: usize,
    buffer_pool: Arc<BufferPool>,
    log: Arc<LogManager>,
    free_pages: Mutex<HashSet<PageNum>>,
}

impl RecordFile {
    pub fn new(pool_id: PoolId, record_size: usize, buffer_pool: Arc<BufferPool>, log: Arc<LogManager>) -> Self {
        RecordFile {
            pool_id,
            record_size,
            buffer_pool,
            log,
            free_pages: Mutex::new(HashSet::new()),
        }
    }

    fn init_empty_page(&self, page_num: PageNum) -> StorageResult<()> {
        let frame = self.buffer_pool.get_page(PageId::new(self.pool_id, page_num))?;
        let _guard = frame.latch.write_lock();
        frame.with_bytes_mut(|bytes| page::init_empty_page(bytes, self.record_size));
        let entry = RecordLogEntry {
            pool_id: self.pool_id,
            op: RecordOp::InitPage,
            page_num,
            slot_num: 0,
            record_size: self.record_size,
            record: Vec::new(),
        };
        let lsn = self.log.append(ModuleId::RecordManager, entry.encode());
        frame.set_lsn(lsn);
        frame.mark_dirty();
        self.buffer_pool.unpin(&frame);
        Ok(())
    }

    /// Allocates and initializes a brand new page, without touching
    /// `free_pages` — the caller decides whether/when to register it.
    fn allocate_page(&self) -> StorageResult<PageNum> {
        let frame = self.buffer_pool.allocate_page(self.pool_id)?;
        let page_num = frame.id.page_num;
        self.buffer_pool.unpin(&frame);
        self.init_empty_page(page_num)?;
        Ok(page_num)
    }

    pub fn insert_record(&self, data: &[u8]) -> StorageResult<Rid> {
        // free_pages lock first, released before the page latch is taken.
        let candidate = {
            let free = self.free_pages.lock();
            free.iter().next().copied()
        };

        let page_num = match candidate {
            Some(p) => p,
            None => self.allocate_page()?,
        };

        let frame = self.buffer_pool.get_page(PageId::new(self.pool_id, page_num))?;
        let slot = {
            let _guard = frame.latch.write_lock();
            let slot = frame.with_bytes_mut(|bytes| page::insert_record(bytes, data))?;
            let full = frame.with_bytes(|bytes| page::empty_slots_count(bytes) == 0);
            let entry = RecordLogEntry {
                pool_id: self.pool_id,
                op: RecordOp::Insert,
                page_num,
                slot_num: slot,
                record_size: self.record_size,
                record: data.to_vec(),
            };
            let lsn = self.log.append(ModuleId::RecordManager, entry.encode());
            frame.set_lsn(lsn);
            frame.mark_dirty();
            if full {
                self.free_pages.lock().remove(&page_num);
            } else {
                self.free_pages.lock().insert(page_num);
            }
            slot
        };
        self.buffer_pool.unpin(&frame);
        Ok(Rid::new(page_num, slot))
    }

    pub fn delete_record(&self, rid: Rid) -> StorageResult<()> {
        let frame = self.buffer_pool.get_page(PageId::new(self.pool_id, rid.page_num))?;
        {
            let _guard = frame.latch.write_lock();
            let record = frame.with_bytes(|bytes| page::get_record(bytes, rid.slot_num).map(|r| r.to_vec()))?;
            frame.with_bytes_mut(|bytes| page::delete_record(bytes, rid.slot_num))?;
            let entry = RecordLogEntry {
                pool_id: self.pool_id,
                op: RecordOp::Delete,
                page_num: rid.page_num,
                slot_num: rid.slot_num,
                record_size: self.record_size,
                record,
            };
            let lsn = self.log.append(ModuleId::RecordManager, entry.encode());
            frame.set_lsn(lsn);
            frame.mark_dirty();
        }
        // page latch released above, free_pages lock taken after.
        self.free_pages.lock().insert(rid.page_num);
        self.buffer_pool.unpin(&frame);
        Ok(())
    }

    pub fn update_record(&self, rid: Rid, data: &[u8]) -> StorageResult<()> {
        let frame = self.buffer_pool.get_page(PageId::new(self.pool_id, rid.page_num))?;
        let _guard = frame.latch.write_lock();
        frame.with_bytes_mut(|bytes| page::update_record(bytes, rid.slot_num, data))?;
        let entry = RecordLogEntry {
            pool_id: self.pool_id,
            op: RecordOp::Update,
            page_num: rid.page_num,
            slot_num: rid.slot_num,
            record_size: self.record_size,
            record: data.to_vec(),
        };
        let lsn = self.log.append(ModuleId::RecordManager, entry.encode());
        frame.set_lsn(lsn);
        frame.mark_dirty();
        drop(_guard);
        self.buffer_pool.unpin(&frame);
        Ok(())
    }

    pub fn get_record(&self, rid: Rid) -> StorageResult<Vec<u8>> {
        let frame = self.buffer_pool.get_page(PageId::new(self.pool_id, rid.page_num))?;
        let _guard = frame.latch.read_lock();
        let out = frame.with_bytes(|bytes| page::get_record(bytes, rid.slot_num).map(|r| r.to_vec()));
        drop(_guard);
        self.buffer_pool.unpin(&frame);
        out
    }

    /// Re-inserts `data` at the exact slot it previously occupied, used
    /// by transaction rollback to physically restore a deleted row.
    /// Unlike `insert_record`, the slot is dictated by the caller rather
    /// than chosen from `free_pages`.
    pub fn restore_record(&self, rid: Rid, data: &[u8]) -> StorageResult<()> {
        let frame = self.buffer_pool.get_page(PageId::new(self.pool_id, rid.page_num))?;
        let _guard = frame.latch.write_lock();
        frame.with_bytes_mut(|bytes| page::redo_insert_at(bytes, rid.slot_num, data));
        let entry = RecordLogEntry {
            pool_id: self.pool_id,
            op: RecordOp::Insert,
            page_num: rid.page_num,
            slot_num: rid.slot_num,
            record_size: self.record_size,
            record: data.to_vec(),
        };
        let lsn = self.log.append(ModuleId::RecordManager, entry.encode());
        frame.set_lsn(lsn);
        frame.mark_dirty();
        drop(_guard);
        self.free_pages.lock().insert(rid.page_num);
        self.buffer_pool.unpin(&frame);
        Ok(())
    }

    pub fn page_count(&self) -> StorageResult<usize> {
        // Page 0 is reserved for the buffer-pool file header, so heap
        // pages start at 1.
        let mut count = 0;
        loop {
            match self.buffer_pool.get_page(PageId::new(self.pool_id, count + 1)) {
                Ok(frame) => {
                    self.buffer_pool.unpin(&frame);
                    count += 1;
                }
                Err(_) => break,
            }
        }
        Ok(count)
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub(crate) fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Applies a [`RecordLogEntry`] during redo, following the redo rule
    ///: skip if the frame's LSN already covers this entry's
    /// LSN, otherwise apply and stamp the frame with the entry's LSN.
    pub fn redo(&self, entry_lsn: u64, entry: &RecordLogEntry) -> StorageResult<()> {
        let frame = self.buffer_pool.get_page(PageId::new(entry.pool_id, entry.page_num))?;
        let _guard = frame.latch.write_lock();
        if frame.lsn() >= entry_lsn {
            self.buffer_pool.unpin(&frame);
            return Ok(());
        }
        match entry.op {
            RecordOp::InitPage => {
                frame.with_bytes_mut(|bytes| page::init_empty_page(bytes, entry.record_size));
            }
            RecordOp::Insert => {
                frame.with_bytes_mut(|bytes| {
                    page::redo_insert_at(bytes, entry.slot_num, &entry.record)
                });
            }
            RecordOp::Delete => {
                let _ = frame.with_bytes_mut(|bytes| page::delete_record(bytes, entry.slot_num));
            }
            RecordOp::Update => {
                let _ = frame.with_bytes_mut(|bytes| {
                    page::update_record(bytes, entry.slot_num, &entry.record)
                });
            }
        }
        frame.set_lsn(entry_lsn);
        frame.mark_dirty();
        self.buffer_pool.unpin(&frame);
        Ok(())
    }
}

#[allow(dead_code)]
pub fn storage_format_tag() -> u8 {
    0 // row format; 1 would be PAX (see crate::record::pax)
}
