//! Range scan across the leaf sibling chain. The scan
//! latches one leaf at a time using `try_read_latch`, never blocking —
//! if the next leaf is currently write-latched by a concurrent
//! insert/delete, the scan surfaces [`StorageError::LockedNeedWait`] so
//! the caller can retry instead of deadlocking against the opposite
//! descent direction.

use crate::buffer_pool::Frame;
use crate::error::{StorageError, StorageResult};
use crate::index::btree::BTree;
use crate::index::page;
use crate::page::PageId;
use crate::record::rid::Rid;
use std::sync::Arc;

pub struct RangeScan<'a> {
    tree: &'a BTree,
    leaf: Option<Arc<Frame>>,
    slot: usize,
    upper_bound: Option<Vec<u8>>,
}

impl<'a> RangeScan<'a> {
    /// Starts a scan at the first leaf entry `>= lower_bound` (or the
    /// very first entry, if `lower_bound` is `None`), stopping once a
    /// key `> upper_bound` is reached.
    pub fn open(tree: &'a BTree, lower_bound: Option<&[u8]>, upper_bound: Option<&[u8]>) -> StorageResult<Self> {
        let leaf = tree.leaf_for_scan_start(lower_bound)?;
        let slot = match lower_bound {
            Some(key) => leaf.with_bytes(|b| match page::leaf_find_first_key(b, key) {
                Some(i) => i,
                None => page::header(b).size,
            }),
            None => 0,
        };
        Ok(RangeScan {
            tree,
            leaf: Some(leaf),
            slot,
            upper_bound: upper_bound.map(|k| k.to_vec()),
        })
    }

    /// Returns the next `(key, rid)` pair, or `Ok(None)` at the end of
    /// the range. A leaf latched by a concurrent writer surfaces
    /// [`StorageError::LockedNeedWait`] rather than blocking.
    pub fn next(&mut self) -> StorageResult<Option<(Vec<u8>, Rid)>> {
        loop {
            let leaf = match &self.leaf {
                Some(l) => Arc::clone(l),
                None => return Ok(None),
            };

            let (size, past_end) = leaf.with_bytes(|b| {
                let h = page::header(b);
                (h.size, self.slot >= h.size)
            });

            if !past_end {
                let (key, rid) = leaf.with_bytes(|b| (page::leaf_key_at(b, self.slot).to_vec(), page::leaf_rid_at(b, self.slot)));
                if let Some(bound) = &self.upper_bound {
                    if key.as_slice() > bound.as_slice() {
                        leaf.latch.unlock_read();
                        self.tree.buffer_pool_handle().unpin(&leaf);
                        self.leaf = None;
                        return Ok(None);
                    }
                }
                self.slot += 1;
                return Ok(Some((key, rid)));
            }

            let next_page = leaf.with_bytes(|b| page::header(b).next_brother);
            leaf.latch.unlock_read();
            self.tree.buffer_pool_handle().unpin(&leaf);
            self.leaf = None;

            let next_page = match next_page {
                Some(p) => p,
                None => return Ok(None),
            };
            let next_id = PageId::new(self.tree.pool_id_handle(), next_page);
            let next_frame = self.tree.buffer_pool_handle().get_page(next_id)?;
            match next_frame.latch.try_read_latch() {
                Some(guard) => {
                    std::mem::forget(guard);
                }
                None => {
                    self.tree.buffer_pool_handle().unpin(&next_frame);
                    return Err(StorageError::LockedNeedWait);
                }
            };
            self.leaf = Some(next_frame);
            self.slot = 0;
            let _ = size;
        }
    }
}

impl<'a> Drop for RangeScan<'a> {
    fn drop(&mut self) {
        if let Some(leaf) = self.leaf.take() {
            leaf.latch.unlock_read();
            self.tree.buffer_pool_handle().unpin(&leaf);
        }
    }
}
