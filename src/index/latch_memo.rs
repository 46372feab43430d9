//! Records every latch/pin a crabbing descent has acquired so it can
//! release a prefix of them in one call: records the sequence of
//! (frame, latch-type) acquisitions for a mini-transaction; release is a
//! single `release_to(point)` that unwinds in reverse order.
//!
//! Grounded on the closure-based ancestor release in
//! `btree::table::insert_crab` (there: a `ParentAction` closure run once
//! the current page proves safe), generalized into data instead of
//! nested closures so arbitrary descent depth works without recursion
//! through the call stack's closure chain.

use crate::buffer_pool::{BufferPool, Frame};
use crate::page::PageId;
use std::sync::Arc;

#[derive(Clone, Copy)]
enum Kind {
    Read,
    Write,
}

pub struct LatchMemo {
    buffer_pool: Arc<BufferPool>,
    entries: Vec<(Arc<Frame>, Kind)>,
    disposed: Vec<PageId>,
}

impl LatchMemo {
    pub fn new(buffer_pool: Arc<BufferPool>) -> Self {
        LatchMemo {
            buffer_pool,
            entries: Vec::new(),
            disposed: Vec::new(),
        }
    }

    /// Fetches and write-latches `id`, recording the acquisition.
    pub fn acquire_write(&mut self, id: PageId) -> crate::error::StorageResult<Arc<Frame>> {
        let frame = self.buffer_pool.get_page(id)?;
        std::mem::forget(frame.latch.write_lock());
        self.entries.push((Arc::clone(&frame), Kind::Write));
        Ok(frame)
    }

    pub fn acquire_read(&mut self, id: PageId) -> crate::error::StorageResult<Arc<Frame>> {
        let frame = self.buffer_pool.get_page(id)?;
        std::mem::forget(frame.latch.read_lock());
        self.entries.push((Arc::clone(&frame), Kind::Read));
        Ok(frame)
    }

    /// A page this mini-transaction decided to free, recorded so the
    /// caller can finish the disposal (WAL entry + `free_pages`/free-list
    /// update) once the whole mutation commits.
    pub fn mark_disposed(&mut self, id: PageId) {
        self.disposed.push(id);
    }

    pub fn disposed_pages(&self) -> &[PageId] {
        &self.disposed
    }

    pub fn point(&self) -> usize {
        self.entries.len()
    }

    /// Returns a clone of the frame at acquisition index `i` — used to
    /// reach an ancestor still held in the memo without releasing it.
    pub fn frame_at(&self, i: usize) -> Arc<Frame> {
        Arc::clone(&self.entries[i].0)
    }

    /// Releases every acquisition in `[from, to)`, in reverse order,
    /// without disturbing entries outside the range. This is the
    /// primitive "drop every ancestor above the newly-safe node" needs:
    /// releasing `[from, point()-1)` keeps only the most recently
    /// acquired (and now known-safe) frame latched.
    pub fn release_range(&mut self, from: usize, to: usize) {
        for i in (from..to).rev() {
            let (frame, kind) = self.entries.remove(i);
            match kind {
                Kind::Write => frame.latch.unlock_write(),
                Kind::Read => frame.latch.unlock_read(),
            }
            self.buffer_pool.unpin(&frame);
        }
    }

    /// Unwinds acquisitions back to `point`, in reverse order.
    pub fn release_to(&mut self, point: usize) {
        let len = self.entries.len();
        self.release_range(point, len);
    }

    pub fn release_all(&mut self) {
        self.release_to(0);
    }
}

impl Drop for LatchMemo {
    fn drop(&mut self) {
        self.release_all();
    }
}
