//! Crabbing-latch B+Tree: insert with propagating split,
//! delete with coalesce-or-redistribute, and the root-identity lock that
//! makes both safe under concurrent access.
//!
//! Grounded on the *shape* of `src/btree/table/table.rs` (one B+Tree per
//! file, a dedicated header page holding the root pointer, allocate/free
//! page bookkeeping) with the mutation algorithms specified fresh, since
//! `table/insert_crab.rs`'s own crabbing insert is an
//! unfinished sketch (`todo!()` in its parent-propagation branch) rather
//! than a working implementation to adapt.

use std::convert::TryInto;
use crate::buffer_pool::{BufferPool, Frame};
use crate::error::{StorageError, StorageResult};
use crate::index::latch_memo::LatchMemo;
use crate::index::log::{self, BTreeLogEntry, BplusTreeMiniTransaction};
use crate::index::page;
use crate::page::{Lsn, PageId, PageNum, PoolId};
use crate::record::rid::Rid;
use crate::util::HandyRwLock;
use crate::wal::manager::LogManager;
use parking_lot::lock_api::RwLockWriteGuard;
use parking_lot::{RawRwLock, RwLock};
use std::collections::HashSet;
use std::sync::Arc;

/// The tree's own header page (page 1, `CATALOG_PAGE`), holding
/// only the current root page number. Separate from the B+Tree's
/// logical ops so the root-pointer swap has its own latch scope.
fn root_page_num_bytes(bytes: &[u8]) -> PageNum {
    u64::from_be_bytes(bytes[0..8].try_into().unwrap()) as PageNum
}

fn write_root_page_num(bytes: &mut [u8], root: PageNum) {
    bytes[0..8].copy_from_slice(&(root as u64).to_be_bytes());
}

pub struct BTree {
    pool_id: PoolId,
    key_len: usize,
    buffer_pool: Arc<BufferPool>,
    log: Arc<LogManager>,
    /// Protects the *identity* of the root page across the descent,
    /// independent of the page-1 write latch that protects the root
    /// pointer's on-disk bytes.
    root_lock: RwLock<()>,
    free_pages: parking_lot::Mutex<HashSet<PageNum>>,
}

impl BTree {
    /// Opens an existing tree file, or bootstraps a fresh one (header
    /// page + a single empty leaf root) if `pool_id`'s file is new.
    pub fn open(pool_id: PoolId, key_len: usize, buffer_pool: Arc<BufferPool>, log: Arc<LogManager>) -> StorageResult<Arc<Self>> {
        let tree = Arc::new(BTree {
            pool_id,
            key_len,
            buffer_pool,
            log,
            root_lock: RwLock::new(()),
            free_pages: parking_lot::Mutex::new(HashSet::new()),
        });
        tree.bootstrap_if_new()?;
        Ok(tree)
    }

    fn bootstrap_if_new(&self) -> StorageResult<()> {
        let header_id = PageId::new(self.pool_id, crate::page::CATALOG_PAGE);
        let header = self.buffer_pool.get_page(header_id)?;
        let already_initialized = header.with_bytes(|b| b.iter().any(|&byte| byte != 0));
        if already_initialized {
            self.buffer_pool.unpin(&header);
            return Ok(());
        }
        let _guard = header.latch.write_lock();
        let leaf = self.allocate_page(true)?;
        leaf.with_bytes_mut(|b| page::init_leaf(b, self.key_len, crate::page::CATALOG_PAGE));
        header.with_bytes_mut(|b| write_root_page_num(b, leaf.id.page_num));

        let mut mtx = BplusTreeMiniTransaction::new();
        mtx.log(Arc::clone(&leaf), BTreeLogEntry::LeafInitEmpty {
            pool_id: self.pool_id,
            page_num: leaf.id.page_num,
            key_len: self.key_len,
            parent: crate::page::CATALOG_PAGE,
        });
        mtx.log(Arc::clone(&header), BTreeLogEntry::InitHeaderPage {
            pool_id: self.pool_id,
            root_page: leaf.id.page_num,
        });
        mtx.commit(&self.log);
        drop(_guard);
        self.buffer_pool.unpin(&leaf);
        self.buffer_pool.unpin(&header);
        Ok(())
    }

    /// The current root's page number. Exposed read-only so tests and
    /// diagnostics can inspect tree shape without reaching into
    /// `pub(crate)` internals.
    pub fn root_page_num(&self) -> StorageResult<PageNum> {
        let header = self.buffer_pool.get_page(PageId::new(self.pool_id, crate::page::CATALOG_PAGE))?;
        let _guard = header.latch.read_lock();
        let root = header.with_bytes(root_page_num_bytes);
        drop(_guard);
        self.buffer_pool.unpin(&header);
        Ok(root)
    }

    /// Whether the current root node is a leaf — true once the tree has
    /// shrunk back down to a single page. Test/diagnostic convenience,
    /// mirroring `table.rs`'s `pages_count()` introspection style.
    pub fn root_is_leaf(&self) -> StorageResult<bool> {
        let root_num = self.root_page_num()?;
        let frame = self.buffer_pool.get_page(PageId::new(self.pool_id, root_num))?;
        let _guard = frame.latch.read_lock();
        let is_leaf = frame.with_bytes(|b| page::header(b).is_leaf);
        drop(_guard);
        self.buffer_pool.unpin(&frame);
        Ok(is_leaf)
    }

    fn allocate_page(&self, is_leaf: bool) -> StorageResult<Arc<Frame>> {
        if let Some(reused) = self.free_pages.lock().iter().next().copied() {
            self.free_pages.lock().remove(&reused);
            let frame = self.buffer_pool.get_page(PageId::new(self.pool_id, reused))?;
            return Ok(frame);
        }
        let _ = is_leaf;
        self.buffer_pool.allocate_page(self.pool_id)
    }

    fn free_page(&self, id: PageId) {
        self.buffer_pool.discard_page(id);
        self.free_pages.lock().insert(id.page_num);
    }

    // ---- crabbing descent -------------------------------------------------

    /// Walks root-to-leaf under exclusive latches, releasing every
    /// ancestor as soon as a descendant proves safe for `insert`/delete.
    /// Returns the latch memo (holding whatever remains latched: the
    /// leaf, plus any unsafe ancestors), the leaf frame, and the
    /// root-identity guard if it hasn't already been released.
    fn crabbing_walk_to_leaf<'a>(
        &'a self,
        key: &[u8],
        for_insert: bool,
    ) -> StorageResult<(LatchMemo, Arc<Frame>, Option<RwLockWriteGuard<'a, RawRwLock, ()>>)> {
        let mut root_guard = Some(self.root_lock.wl());
        let mut memo = LatchMemo::new(Arc::clone(&self.buffer_pool));
        let root_id = PageId::new(self.pool_id, self.root_page_num()?);
        let mut current = memo.acquire_write(root_id)?;

        let current_is_root_safe = current.with_bytes(|b| {
            if for_insert { page::is_safe_for_insert(b) } else { page::is_safe_for_delete(b, true) }
        });
        if current_is_root_safe {
            root_guard.take();
        }

        loop {
            let is_leaf = current.with_bytes(|b| page::header(b).is_leaf);
            if is_leaf {
                return Ok((memo, current, root_guard));
            }
            let child_num = current.with_bytes(|b| {
                let idx = page::internal_lookup_child_index(b, key);
                page::internal_child_at(b, idx)
            });
            let child = memo.acquire_write(PageId::new(self.pool_id, child_num))?;
            let safe = child.with_bytes(|b| {
                if for_insert { page::is_safe_for_insert(b) } else { page::is_safe_for_delete(b, false) }
            });
            if safe {
                memo.release_range(0, memo.point() - 1);
                root_guard.take();
            }
            current = child;
        }
    }

    /// READ-mode descent: shared latches, parent released the instant the
    /// child is latched.
    fn walk_to_leaf_shared(&self, key: &[u8]) -> StorageResult<Arc<Frame>> {
        let _root_guard = self.root_lock.rl();
        let mut current = self.buffer_pool.get_page(PageId::new(self.pool_id, self.root_page_num()?))?;
        std::mem::forget(current.latch.read_lock());
        loop {
            let is_leaf = current.with_bytes(|b| page::header(b).is_leaf);
            if is_leaf {
                return Ok(current);
            }
            let child_num = current.with_bytes(|b| {
                let idx = page::internal_lookup_child_index(b, key);
                page::internal_child_at(b, idx)
            });
            let child = self.buffer_pool.get_page(PageId::new(self.pool_id, child_num))?;
            std::mem::forget(child.latch.read_lock());
            current.latch.unlock_read();
            self.buffer_pool.unpin(&current);
            current = child;
        }
    }

    pub(crate) fn buffer_pool_handle(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    pub(crate) fn pool_id_handle(&self) -> PoolId {
        self.pool_id
    }

    /// Finds the leftmost leaf a range scan starting at `lower_bound`
    /// should begin on (the leaf itself, shared-latched and pinned).
    pub(crate) fn leaf_for_scan_start(&self, lower_bound: Option<&[u8]>) -> StorageResult<Arc<Frame>> {
        match lower_bound {
            Some(key) => self.walk_to_leaf_shared(key),
            None => self.walk_to_leaf_shared(&vec![0u8; self.key_len]),
        }
    }

    // ---- point lookup -------------------------------------------------

    pub fn lookup(&self, key: &[u8]) -> StorageResult<Option<Rid>> {
        let leaf = self.walk_to_leaf_shared(key)?;
        let found = leaf.with_bytes(|b| {
            let h = page::header(b);
            (0..h.size)
                .find(|&i| page::leaf_key_at(b, i) == key)
                .map(|i| page::leaf_rid_at(b, i))
        });
        leaf.latch.unlock_read();
        self.buffer_pool.unpin(&leaf);
        Ok(found)
    }

    // ---- insert ---------------------------------------------------------

    pub fn insert_entry(&self, key: &[u8], rid: Rid) -> StorageResult<()> {
        if key.len() != self.key_len {
            return Err(StorageError::InvalidArgument("key length mismatch".into()));
        }
        let (mut memo, leaf, root_guard) = self.crabbing_walk_to_leaf(key, true)?;
        let mut mtx = BplusTreeMiniTransaction::new();

        let mut split = self.insert_into_leaf(&leaf, key, rid, &mut mtx)?;
        let mut level_from_top = memo.point() as isize - 2;
        let mut child_frame = leaf;

        while let Some((sep_key, new_right)) = split {
            if level_from_top < 0 {
                self.create_new_root(&child_frame, &sep_key, new_right, &mut mtx)?;
                break;
            }
            let parent = memo.frame_at(level_from_top as usize);
            split = self.insert_into_internal(&parent, &sep_key, new_right, &mut mtx)?;
            child_frame = parent;
            level_from_top -= 1;
        }

        drop(root_guard);
        mtx.commit(&self.log);
        Ok(())
    }

    fn insert_into_leaf(
        &self,
        leaf: &Arc<Frame>,
        key: &[u8],
        rid: Rid,
        mtx: &mut BplusTreeMiniTransaction,
    ) -> StorageResult<Option<(Vec<u8>, PageNum)>> {
        let (insert_idx, already_present) = leaf.with_bytes(|b| match page::leaf_find(b, key, rid) {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        });
        if already_present {
            return Err(StorageError::DuplicateKey);
        }

        let fits = leaf.with_bytes(|b| {
            let h = page::header(b);
            h.size < page::max_size(b.len(), h.key_len, true)
        });
        if fits {
            leaf.with_bytes_mut(|b| page::leaf_insert_at(b, insert_idx, key, rid))?;
            mtx.log(Arc::clone(leaf), BTreeLogEntry::NodeInsertItems {
                pool_id: self.pool_id,
                page_num: leaf.id.page_num,
                is_leaf: true,
                index: insert_idx,
                key: key.to_vec(),
                value: log::leaf_entry_value(rid),
            });
            return Ok(None);
        }

        let mut entries = leaf.with_bytes(|b| {
            let h = page::header(b);
            (0..h.size).map(|i| (page::leaf_key_at(b, i).to_vec(), page::leaf_rid_at(b, i))).collect::<Vec<_>>()
        });
        entries.insert(insert_idx, (key.to_vec(), rid));
        let mid = entries.len() / 2;
        let (left_part, right_part) = entries.split_at(mid);

        let parent = leaf.with_bytes(|b| page::header(b).parent_page_num);
        let right = self.allocate_page(true)?;
        let old_next = leaf.with_bytes(|b| page::header(b).next_brother);

        self.rebuild_leaf(leaf, parent, left_part, mtx);
        self.rebuild_leaf(&right, parent, right_part, mtx);

        leaf.with_bytes_mut(|b| page::set_next_brother(b, Some(right.id.page_num)));
        mtx.log(Arc::clone(leaf), BTreeLogEntry::LeafSetNextPage {
            pool_id: self.pool_id,
            page_num: leaf.id.page_num,
            next: Some(right.id.page_num),
        });
        right.with_bytes_mut(|b| page::set_next_brother(b, old_next));
        mtx.log(Arc::clone(&right), BTreeLogEntry::LeafSetNextPage {
            pool_id: self.pool_id,
            page_num: right.id.page_num,
            next: old_next,
        });

        let sep_key = right_part[0].0.clone();
        let new_right_page = right.id.page_num;
        self.buffer_pool.unpin(&right);
        Ok(Some((sep_key, new_right_page)))
    }

    fn insert_into_internal(
        &self,
        node: &Arc<Frame>,
        sep_key: &[u8],
        new_child: PageNum,
        mtx: &mut BplusTreeMiniTransaction,
    ) -> StorageResult<Option<(Vec<u8>, PageNum)>> {
        let idx = node.with_bytes(|b| page::internal_lookup_child_index(b, sep_key) + 1);
        let fits = node.with_bytes(|b| {
            let h = page::header(b);
            h.size < page::max_size(b.len(), h.key_len, false)
        });
        self.set_parent_logged(new_child, node.id.page_num, mtx);
        if fits {
            node.with_bytes_mut(|b| page::internal_insert_at(b, idx, sep_key, new_child))?;
            mtx.log(Arc::clone(node), BTreeLogEntry::NodeInsertItems {
                pool_id: self.pool_id,
                page_num: node.id.page_num,
                is_leaf: false,
                index: idx,
                key: sep_key.to_vec(),
                value: log::internal_entry_value(new_child),
            });
            return Ok(None);
        }

        let mut entries = node.with_bytes(|b| {
            let h = page::header(b);
            (0..h.size).map(|i| (page::internal_key_at(b, i).to_vec(), page::internal_child_at(b, i))).collect::<Vec<_>>()
        });
        entries.insert(idx, (sep_key.to_vec(), new_child));
        let mid = entries.len() / 2;
        let (left_part, right_part) = entries.split_at(mid);

        let parent = node.with_bytes(|b| page::header(b).parent_page_num);
        let right = self.allocate_page(false)?;

        // right_part[0]'s key becomes the promoted separator; the new
        // right node's own slot 0 uses it as a dummy (child only).
        let promoted_key = right_part[0].0.clone();
        let mut right_entries = right_part.to_vec();
        right_entries[0].0 = vec![0u8; self.key_len];

        self.rebuild_internal(node, parent, left_part, mtx);
        self.rebuild_internal(&right, parent, &right_entries, mtx);
        for (_, child) in &right_entries {
            self.set_parent_logged(*child, right.id.page_num, mtx);
        }

        let new_right_page = right.id.page_num;
        self.buffer_pool.unpin(&right);
        Ok(Some((promoted_key, new_right_page)))
    }

    fn create_new_root(
        &self,
        old_root: &Arc<Frame>,
        sep_key: &[u8],
        new_child: PageNum,
        mtx: &mut BplusTreeMiniTransaction,
    ) -> StorageResult<()> {
        let new_root = self.allocate_page(false)?;
        new_root.with_bytes_mut(|b| page::init_internal(b, self.key_len, crate::page::CATALOG_PAGE));
        new_root.with_bytes_mut(|b| page::internal_insert_at(b, 0, &vec![0u8; self.key_len], old_root.id.page_num)).unwrap();
        new_root.with_bytes_mut(|b| page::internal_insert_at(b, 1, sep_key, new_child)).unwrap();

        old_root.with_bytes_mut(|b| page::set_parent_page(b, new_root.id.page_num));
        self.set_parent_logged(new_child, new_root.id.page_num, mtx);
        mtx.log(Arc::clone(old_root), BTreeLogEntry::SetParentPage {
            pool_id: self.pool_id,
            page_num: old_root.id.page_num,
            parent: new_root.id.page_num,
        });

        let header = self.buffer_pool.get_page(PageId::new(self.pool_id, crate::page::CATALOG_PAGE))?;
        let _guard = header.latch.write_lock();
        header.with_bytes_mut(|b| write_root_page_num(b, new_root.id.page_num));
        mtx.log(Arc::clone(&header), BTreeLogEntry::InternalCreateNewRoot {
            pool_id: self.pool_id,
            new_root_page: new_root.id.page_num,
            old_root: old_root.id.page_num,
            key: sep_key.to_vec(),
            right_child: new_child,
        });
        drop(_guard);
        self.buffer_pool.unpin(&header);
        self.buffer_pool.unpin(&new_root);
        Ok(())
    }

    fn rebuild_leaf(&self, frame: &Arc<Frame>, parent: PageNum, entries: &[(Vec<u8>, Rid)], mtx: &mut BplusTreeMiniTransaction) {
        frame.with_bytes_mut(|b| page::init_leaf(b, self.key_len, parent));
        mtx.log(Arc::clone(frame), BTreeLogEntry::LeafInitEmpty {
            pool_id: self.pool_id,
            page_num: frame.id.page_num,
            key_len: self.key_len,
            parent,
        });
        for (i, (key, rid)) in entries.iter().enumerate() {
            frame.with_bytes_mut(|b| page::leaf_insert_at(b, i, key, *rid)).unwrap();
            mtx.log(Arc::clone(frame), BTreeLogEntry::NodeInsertItems {
                pool_id: self.pool_id,
                page_num: frame.id.page_num,
                is_leaf: true,
                index: i,
                key: key.clone(),
                value: log::leaf_entry_value(*rid),
            });
        }
    }

    fn rebuild_internal(&self, frame: &Arc<Frame>, parent: PageNum, entries: &[(Vec<u8>, PageNum)], mtx: &mut BplusTreeMiniTransaction) {
        frame.with_bytes_mut(|b| page::init_internal(b, self.key_len, parent));
        mtx.log(Arc::clone(frame), BTreeLogEntry::InternalInitEmpty {
            pool_id: self.pool_id,
            page_num: frame.id.page_num,
            key_len: self.key_len,
            parent,
        });
        for (i, (key, child)) in entries.iter().enumerate() {
            frame.with_bytes_mut(|b| page::internal_insert_at(b, i, key, *child)).unwrap();
            mtx.log(Arc::clone(frame), BTreeLogEntry::NodeInsertItems {
                pool_id: self.pool_id,
                page_num: frame.id.page_num,
                is_leaf: false,
                index: i,
                key: key.clone(),
                value: log::internal_entry_value(*child),
            });
        }
    }

    fn set_parent_logged(&self, child_page: PageNum, new_parent: PageNum, mtx: &mut BplusTreeMiniTransaction) {
        if let Ok(frame) = self.buffer_pool.get_page(PageId::new(self.pool_id, child_page)) {
            let _guard = frame.latch.write_lock();
            frame.with_bytes_mut(|b| page::set_parent_page(b, new_parent));
            mtx.log(Arc::clone(&frame), BTreeLogEntry::SetParentPage {
                pool_id: self.pool_id,
                page_num: child_page,
                parent: new_parent,
            });
            drop(_guard);
            self.buffer_pool.unpin(&frame);
        }
    }

    // ---- delete -----------------------------------------------------

    pub fn delete_entry(&self, key: &[u8], rid: Rid) -> StorageResult<()> {
        let (memo, leaf, root_guard) = self.crabbing_walk_to_leaf(key, false)?;
        let mut mtx = BplusTreeMiniTransaction::new();

        let is_root = memo.point() == 1;
        let mut needs_fix = self.remove_from_leaf(&leaf, key, rid, is_root, &mut mtx)?;
        let mut level_from_top = memo.point() as isize - 2;
        let mut child_frame = leaf;

        while needs_fix {
            if level_from_top < 0 {
                self.adjust_root_if_needed(&child_frame, &mut mtx)?;
                break;
            }
            let parent = memo.frame_at(level_from_top as usize);
            let is_parent_root = level_from_top == 0;
            needs_fix = self.fix_internal_after_shrink(&parent, child_frame.id.page_num, is_parent_root, &mut mtx)?;
            child_frame = parent;
            level_from_top -= 1;
        }

        drop(root_guard);
        mtx.commit(&self.log);
        Ok(())
    }

    /// Removes `(key, rid)` from `leaf`. Returns `true` if the leaf fell
    /// below `min_size` and a sibling merge/redistribute (and therefore
    /// possibly a parent-slot removal) was performed.
    fn remove_from_leaf(&self, leaf: &Arc<Frame>, key: &[u8], rid: Rid, is_root: bool, mtx: &mut BplusTreeMiniTransaction) -> StorageResult<bool> {
        let idx = leaf.with_bytes(|b| page::leaf_find(b, key, rid)).map_err(|_| StorageError::RecordNotExist)?;
        leaf.with_bytes_mut(|b| page::leaf_remove_at(b, idx));
        mtx.log(Arc::clone(leaf), BTreeLogEntry::NodeRemoveItems {
            pool_id: self.pool_id,
            page_num: leaf.id.page_num,
            is_leaf: true,
            index: idx,
            key: key.to_vec(),
            value: log::leaf_entry_value(rid),
        });

        let min = leaf.with_bytes(|b| page::min_size(b.len(), self.key_len, true));
        let size = leaf.with_bytes(|b| page::header(b).size);
        if is_root || size >= min {
            return Ok(false);
        }

        let parent_num = leaf.with_bytes(|b| page::header(b).parent_page_num);
        let parent = self.buffer_pool.get_page(PageId::new(self.pool_id, parent_num))?;
        let _parent_guard = parent.latch.write_lock();
        let self_idx = parent.with_bytes(|b| {
            let h = page::header(b);
            (0..h.size).find(|&i| page::internal_child_at(b, i) == leaf.id.page_num).unwrap()
        });
        let parent_size = parent.with_bytes(|b| page::header(b).size);
        let (sibling_idx, leaf_is_left) = if self_idx + 1 < parent_size { (self_idx + 1, true) } else { (self_idx - 1, false) };
        let sibling_page = parent.with_bytes(|b| page::internal_child_at(b, sibling_idx));
        let sibling = self.buffer_pool.get_page(PageId::new(self.pool_id, sibling_page))?;
        let _sibling_guard = sibling.latch.write_lock();

        let (left, right) = if leaf_is_left { (leaf, &sibling) } else { (&sibling, leaf) };
        let mut combined = left.with_bytes(|b| {
            let h = page::header(b);
            (0..h.size).map(|i| (page::leaf_key_at(b, i).to_vec(), page::leaf_rid_at(b, i))).collect::<Vec<_>>()
        });
        combined.extend(right.with_bytes(|b| {
            let h = page::header(b);
            (0..h.size).map(|i| (page::leaf_key_at(b, i).to_vec(), page::leaf_rid_at(b, i))).collect::<Vec<_>>()
        }));
        let max = left.with_bytes(|b| page::max_size(b.len(), self.key_len, true));

        let parent_removed;
        if combined.len() <= max {
            let left_next = right.with_bytes(|b| page::header(b).next_brother);
            self.rebuild_leaf(left, parent_num, &combined, mtx);
            left.with_bytes_mut(|b| page::set_next_brother(b, left_next));
            mtx.log(Arc::clone(left), BTreeLogEntry::LeafSetNextPage { pool_id: self.pool_id, page_num: left.id.page_num, next: left_next });

            let right_slot_in_parent = if leaf_is_left { sibling_idx } else { self_idx };
            parent.with_bytes_mut(|b| page::internal_remove_at(b, right_slot_in_parent));
            mtx.log(Arc::clone(&parent), BTreeLogEntry::NodeRemoveItems {
                pool_id: self.pool_id,
                page_num: parent.id.page_num,
                is_leaf: false,
                index: right_slot_in_parent,
                key: vec![0u8; self.key_len],
                value: log::internal_entry_value(right.id.page_num),
            });
            let disposed_id = right.id;
            self.free_page(disposed_id);
            parent_removed = true;
        } else {
            let mid = combined.len() / 2;
            let (l, r) = combined.split_at(mid);
            self.rebuild_leaf(left, parent_num, l, mtx);
            let right_next = right.with_bytes(|b| page::header(b).next_brother);
            self.rebuild_leaf(right, parent_num, r, mtx);
            right.with_bytes_mut(|b| page::set_next_brother(b, right_next));
            mtx.log(Arc::clone(right), BTreeLogEntry::LeafSetNextPage { pool_id: self.pool_id, page_num: right.id.page_num, next: right_next });
            left.with_bytes_mut(|b| page::set_next_brother(b, Some(right.id.page_num)));
            mtx.log(Arc::clone(left), BTreeLogEntry::LeafSetNextPage { pool_id: self.pool_id, page_num: left.id.page_num, next: Some(right.id.page_num) });

            let right_slot_in_parent = if leaf_is_left { sibling_idx } else { self_idx };
            let new_sep = r[0].0.clone();
            parent.with_bytes_mut(|b| {
                let cur = page::internal_child_at(b, right_slot_in_parent);
                page::internal_remove_at(b, right_slot_in_parent);
                page::internal_insert_at(b, right_slot_in_parent, &new_sep, cur).unwrap();
            });
            mtx.log(Arc::clone(&parent), BTreeLogEntry::InternalUpdateKey {
                pool_id: self.pool_id,
                page_num: parent.id.page_num,
                index: right_slot_in_parent,
                key: new_sep,
            });
            parent_removed = false;
        }

        drop(_sibling_guard);
        drop(_parent_guard);
        self.buffer_pool.unpin(&sibling);
        self.buffer_pool.unpin(&parent);
        Ok(parent_removed)
    }

    fn fix_internal_after_shrink(&self, node: &Arc<Frame>, _just_fixed_child: PageNum, is_root: bool, mtx: &mut BplusTreeMiniTransaction) -> StorageResult<bool> {
        let key_len = self.key_len;
        let safe = node.with_bytes(|b| page::is_safe_for_delete(b, is_root));
        if safe || is_root {
            return Ok(false);
        }

        let parent_num = node.with_bytes(|b| page::header(b).parent_page_num);
        let parent = self.buffer_pool.get_page(PageId::new(self.pool_id, parent_num))?;
        let _parent_guard = parent.latch.write_lock();
        let self_idx = parent.with_bytes(|b| {
            let h = page::header(b);
            (0..h.size).find(|&i| page::internal_child_at(b, i) == node.id.page_num).unwrap()
        });
        let parent_size = parent.with_bytes(|b| page::header(b).size);
        let (sibling_idx, node_is_left) = if self_idx + 1 < parent_size { (self_idx + 1, true) } else { (self_idx - 1, false) };
        let sibling_page = parent.with_bytes(|b| page::internal_child_at(b, sibling_idx));
        let sibling = self.buffer_pool.get_page(PageId::new(self.pool_id, sibling_page))?;
        let _sibling_guard = sibling.latch.write_lock();

        let (left, right) = if node_is_left { (node, &sibling) } else { (&sibling, node) };
        let mut combined = left.with_bytes(|b| {
            let h = page::header(b);
            (0..h.size).map(|i| (page::internal_key_at(b, i).to_vec(), page::internal_child_at(b, i))).collect::<Vec<_>>()
        });
        combined.extend(right.with_bytes(|b| {
            let h = page::header(b);
            (0..h.size).map(|i| (page::internal_key_at(b, i).to_vec(), page::internal_child_at(b, i))).collect::<Vec<_>>()
        }));
        let max = left.with_bytes(|b| page::max_size(b.len(), key_len, false));

        let parent_removed;
        if combined.len() <= max {
            self.rebuild_internal(left, parent_num, &combined, mtx);
            for (_, child) in &combined {
                self.set_parent_logged(*child, left.id.page_num, mtx);
            }
            let right_slot_in_parent = if node_is_left { sibling_idx } else { self_idx };
            parent.with_bytes_mut(|b| page::internal_remove_at(b, right_slot_in_parent));
            mtx.log(Arc::clone(&parent), BTreeLogEntry::NodeRemoveItems {
                pool_id: self.pool_id,
                page_num: parent.id.page_num,
                is_leaf: false,
                index: right_slot_in_parent,
                key: vec![0u8; key_len],
                value: log::internal_entry_value(right.id.page_num),
            });
            self.free_page(right.id);
            parent_removed = true;
        } else {
            let mid = combined.len() / 2;
            let (l, r) = combined.split_at(mid);
            let promoted_key = r[0].0.clone();
            let mut r_owned = r.to_vec();
            r_owned[0].0 = vec![0u8; key_len];
            self.rebuild_internal(left, parent_num, l, mtx);
            self.rebuild_internal(right, parent_num, &r_owned, mtx);
            for (_, child) in l.iter().chain(r_owned.iter()) {
                self.set_parent_logged(*child, if l.iter().any(|(_, c)| c == child) { left.id.page_num } else { right.id.page_num }, mtx);
            }
            let right_slot_in_parent = if node_is_left { sibling_idx } else { self_idx };
            parent.with_bytes_mut(|b| {
                let cur = page::internal_child_at(b, right_slot_in_parent);
                page::internal_remove_at(b, right_slot_in_parent);
                page::internal_insert_at(b, right_slot_in_parent, &promoted_key, cur).unwrap();
            });
            mtx.log(Arc::clone(&parent), BTreeLogEntry::InternalUpdateKey {
                pool_id: self.pool_id,
                page_num: parent.id.page_num,
                index: right_slot_in_parent,
                key: promoted_key,
            });
            parent_removed = false;
        }

        drop(_sibling_guard);
        drop(_parent_guard);
        self.buffer_pool.unpin(&sibling);
        self.buffer_pool.unpin(&parent);
        Ok(parent_removed)
    }

    /// Called when the root itself shrank: if it is an empty leaf or an
    /// internal node with a single child, make that child the new root
    ///.
    fn adjust_root_if_needed(&self, root: &Arc<Frame>, mtx: &mut BplusTreeMiniTransaction) -> StorageResult<()> {
        let (is_leaf, size) = root.with_bytes(|b| (page::header(b).is_leaf, page::header(b).size));
        if is_leaf || size > 1 {
            return Ok(());
        }
        let sole_child = root.with_bytes(|b| page::internal_child_at(b, 0));
        let header = self.buffer_pool.get_page(PageId::new(self.pool_id, crate::page::CATALOG_PAGE))?;
        let _guard = header.latch.write_lock();
        header.with_bytes_mut(|b| write_root_page_num(b, sole_child));
        mtx.log(Arc::clone(&header), BTreeLogEntry::UpdateRootPage { pool_id: self.pool_id, new_root: sole_child });
        drop(_guard);
        self.buffer_pool.unpin(&header);

        self.set_parent_logged(sole_child, crate::page::CATALOG_PAGE, mtx);
        self.free_page(root.id);
        Ok(())
    }

    /// Applies one [`BTreeLogEntry`] during redo, following the same
    /// skip-if-already-applied rule as the record manager's redo:
    /// a frame whose LSN already covers `entry_lsn` is left alone.
    pub fn redo(&self, entry_lsn: Lsn, entry: &BTreeLogEntry) -> StorageResult<()> {
        let frame = self.buffer_pool.get_page(PageId::new(self.pool_id, entry.page_num()))?;
        let _guard = frame.latch.write_lock();
        if frame.lsn() >= entry_lsn {
            self.buffer_pool.unpin(&frame);
            return Ok(());
        }
        match entry {
            BTreeLogEntry::InitHeaderPage { root_page, .. } => {
                frame.with_bytes_mut(|b| write_root_page_num(b, *root_page));
            }
            BTreeLogEntry::UpdateRootPage { new_root, .. } => {
                frame.with_bytes_mut(|b| write_root_page_num(b, *new_root));
            }
            BTreeLogEntry::LeafInitEmpty { key_len, parent, .. } => {
                frame.with_bytes_mut(|b| page::init_leaf(b, *key_len, *parent));
            }
            BTreeLogEntry::InternalInitEmpty { key_len, parent, .. } => {
                frame.with_bytes_mut(|b| page::init_internal(b, *key_len, *parent));
            }
            BTreeLogEntry::NodeInsertItems { is_leaf, index, key, value, .. } => {
                if *is_leaf {
                    let rid = log::leaf_value_to_rid(value);
                    frame.with_bytes_mut(|b| page::leaf_insert_at(b, *index, key, rid)).ok();
                } else {
                    let child = log::value_to_child(value);
                    frame.with_bytes_mut(|b| page::internal_insert_at(b, *index, key, child)).ok();
                }
            }
            BTreeLogEntry::NodeRemoveItems { is_leaf, index, .. } => {
                if *is_leaf {
                    frame.with_bytes_mut(|b| page::leaf_remove_at(b, *index));
                } else {
                    frame.with_bytes_mut(|b| page::internal_remove_at(b, *index));
                }
            }
            BTreeLogEntry::LeafSetNextPage { next, .. } => {
                frame.with_bytes_mut(|b| page::set_next_brother(b, *next));
            }
            BTreeLogEntry::InternalCreateNewRoot { old_root, key, right_child, .. } => {
                frame.with_bytes_mut(|b| {
                    page::init_internal(b, key.len(), crate::page::CATALOG_PAGE);
                    page::internal_insert_at(b, 0, &vec![0u8; key.len()], *old_root).ok();
                    page::internal_insert_at(b, 1, key, *right_child).ok();
                });
            }
            BTreeLogEntry::InternalUpdateKey { index, key, .. } => {
                frame.with_bytes_mut(|b| {
                    let child = page::internal_child_at(b, *index);
                    page::internal_remove_at(b, *index);
                    page::internal_insert_at(b, *index, key, child).ok();
                });
            }
            BTreeLogEntry::SetParentPage { parent, .. } => {
                frame.with_bytes_mut(|b| page::set_parent_page(b, *parent));
            }
        }
        frame.set_lsn(entry_lsn);
        frame.mark_dirty();
        self.buffer_pool.unpin(&frame);
        Ok(())
    }
}
