//! Logical WAL entries for the ten B+Tree mutation shapes, plus
//! [`BplusTreeMiniTransaction`], which batches every
//! entry produced by one logical operation (an insert, a delete, a
//! split, a merge) and either flushes the whole batch to the WAL on
//! success or discards it on failure.
//!
//! Grounded on `src/tx_log/page_log.rs`'s per-operation log-record
//! shapes, widened from page-level physical logging to
//! a logical, multi-entry-per-operation scheme.

use std::convert::TryInto;
use crate::buffer_pool::Frame;
use crate::page::{PageNum, PoolId};
use crate::record::rid::Rid;
use crate::wal::manager::LogManager;
use crate::wal::ModuleId;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum BTreeLogEntry {
    InitHeaderPage { pool_id: PoolId, root_page: PageNum },
    UpdateRootPage { pool_id: PoolId, new_root: PageNum },
    LeafInitEmpty { pool_id: PoolId, page_num: PageNum, key_len: usize, parent: PageNum },
    InternalInitEmpty { pool_id: PoolId, page_num: PageNum, key_len: usize, parent: PageNum },
    NodeInsertItems {
        pool_id: PoolId,
        page_num: PageNum,
        is_leaf: bool,
        index: usize,
        key: Vec<u8>,
        /// The RID (16 bytes) for a leaf entry, or the child page number
        /// (8 bytes, big-endian) for an internal entry.
        value: Vec<u8>,
    },
    NodeRemoveItems {
        pool_id: PoolId,
        page_num: PageNum,
        is_leaf: bool,
        index: usize,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    LeafSetNextPage { pool_id: PoolId, page_num: PageNum, next: Option<PageNum> },
    InternalCreateNewRoot {
        pool_id: PoolId,
        new_root_page: PageNum,
        old_root: PageNum,
        key: Vec<u8>,
        right_child: PageNum,
    },
    InternalUpdateKey { pool_id: PoolId, page_num: PageNum, index: usize, key: Vec<u8> },
    SetParentPage { pool_id: PoolId, page_num: PageNum, parent: PageNum },
}

const TAG_INIT_HEADER: u8 = 0;
const TAG_UPDATE_ROOT: u8 = 1;
const TAG_LEAF_INIT_EMPTY: u8 = 2;
const TAG_INTERNAL_INIT_EMPTY: u8 = 3;
const TAG_NODE_INSERT: u8 = 4;
const TAG_NODE_REMOVE: u8 = 5;
const TAG_LEAF_SET_NEXT: u8 = 6;
const TAG_INTERNAL_NEW_ROOT: u8 = 7;
const TAG_INTERNAL_UPDATE_KEY: u8 = 8;
const TAG_SET_PARENT: u8 = 9;

fn put_key(buf: &mut Vec<u8>, key: &[u8]) {
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(key);
}

fn take_key(buf: &[u8], at: &mut usize) -> Vec<u8> {
    let len = u32::from_be_bytes(buf[*at..*at + 4].try_into().unwrap()) as usize;
    *at += 4;
    let key = buf[*at..*at + len].to_vec();
    *at += len;
    key
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn take_u64(buf: &[u8], at: &mut usize) -> u64 {
    let v = u64::from_be_bytes(buf[*at..*at + 8].try_into().unwrap());
    *at += 8;
    v
}

fn take_opt_page(buf: &[u8], at: &mut usize) -> Option<PageNum> {
    let v = take_u64(buf, at);
    if v == 0 { None } else { Some(v as PageNum) }
}

fn put_opt_page(buf: &mut Vec<u8>, v: Option<PageNum>) {
    put_u64(buf, v.map(|p| p as u64).unwrap_or(0));
}

impl BTreeLogEntry {
    pub fn pool_id(&self) -> PoolId {
        match self {
            BTreeLogEntry::InitHeaderPage { pool_id, .. }
            | BTreeLogEntry::UpdateRootPage { pool_id, .. }
            | BTreeLogEntry::LeafInitEmpty { pool_id, .. }
            | BTreeLogEntry::InternalInitEmpty { pool_id, .. }
            | BTreeLogEntry::NodeInsertItems { pool_id, .. }
            | BTreeLogEntry::NodeRemoveItems { pool_id, .. }
            | BTreeLogEntry::LeafSetNextPage { pool_id, .. }
            | BTreeLogEntry::InternalCreateNewRoot { pool_id, .. }
            | BTreeLogEntry::InternalUpdateKey { pool_id, .. }
            | BTreeLogEntry::SetParentPage { pool_id, .. } => *pool_id,
        }
    }

    /// The page this entry's redo/undo is stamped against. For
    /// `InternalCreateNewRoot`, that's the freshly allocated root page.
    pub fn page_num(&self) -> PageNum {
        match self {
            BTreeLogEntry::InitHeaderPage { .. } => crate::page::CATALOG_PAGE,
            BTreeLogEntry::UpdateRootPage { .. } => crate::page::CATALOG_PAGE,
            BTreeLogEntry::LeafInitEmpty { page_num, .. }
            | BTreeLogEntry::InternalInitEmpty { page_num, .. }
            | BTreeLogEntry::NodeInsertItems { page_num, .. }
            | BTreeLogEntry::NodeRemoveItems { page_num, .. }
            | BTreeLogEntry::LeafSetNextPage { page_num, .. }
            | BTreeLogEntry::InternalUpdateKey { page_num, .. }
            | BTreeLogEntry::SetParentPage { page_num, .. } => *page_num,
            BTreeLogEntry::InternalCreateNewRoot { new_root_page, .. } => *new_root_page,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            BTreeLogEntry::InitHeaderPage { pool_id, root_page } => {
                buf.push(TAG_INIT_HEADER);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *root_page as u64);
            }
            BTreeLogEntry::UpdateRootPage { pool_id, new_root } => {
                buf.push(TAG_UPDATE_ROOT);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *new_root as u64);
            }
            BTreeLogEntry::LeafInitEmpty { pool_id, page_num, key_len, parent } => {
                buf.push(TAG_LEAF_INIT_EMPTY);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *page_num as u64);
                put_u64(&mut buf, *key_len as u64);
                put_u64(&mut buf, *parent as u64);
            }
            BTreeLogEntry::InternalInitEmpty { pool_id, page_num, key_len, parent } => {
                buf.push(TAG_INTERNAL_INIT_EMPTY);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *page_num as u64);
                put_u64(&mut buf, *key_len as u64);
                put_u64(&mut buf, *parent as u64);
            }
            BTreeLogEntry::NodeInsertItems { pool_id, page_num, is_leaf, index, key, value } => {
                buf.push(TAG_NODE_INSERT);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *page_num as u64);
                buf.push(*is_leaf as u8);
                put_u64(&mut buf, *index as u64);
                put_key(&mut buf, key);
                put_key(&mut buf, value);
            }
            BTreeLogEntry::NodeRemoveItems { pool_id, page_num, is_leaf, index, key, value } => {
                buf.push(TAG_NODE_REMOVE);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *page_num as u64);
                buf.push(*is_leaf as u8);
                put_u64(&mut buf, *index as u64);
                put_key(&mut buf, key);
                put_key(&mut buf, value);
            }
            BTreeLogEntry::LeafSetNextPage { pool_id, page_num, next } => {
                buf.push(TAG_LEAF_SET_NEXT);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *page_num as u64);
                put_opt_page(&mut buf, *next);
            }
            BTreeLogEntry::InternalCreateNewRoot { pool_id, new_root_page, old_root, key, right_child } => {
                buf.push(TAG_INTERNAL_NEW_ROOT);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *new_root_page as u64);
                put_u64(&mut buf, *old_root as u64);
                put_key(&mut buf, key);
                put_u64(&mut buf, *right_child as u64);
            }
            BTreeLogEntry::InternalUpdateKey { pool_id, page_num, index, key } => {
                buf.push(TAG_INTERNAL_UPDATE_KEY);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *page_num as u64);
                put_u64(&mut buf, *index as u64);
                put_key(&mut buf, key);
            }
            BTreeLogEntry::SetParentPage { pool_id, page_num, parent } => {
                buf.push(TAG_SET_PARENT);
                put_u64(&mut buf, *pool_id as u64);
                put_u64(&mut buf, *page_num as u64);
                put_u64(&mut buf, *parent as u64);
            }
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.is_empty() {
            return None;
        }
        let tag = buf[0];
        let mut at = 1usize;
        let entry = match tag {
            TAG_INIT_HEADER => BTreeLogEntry::InitHeaderPage {
                pool_id: take_u64(buf, &mut at) as PoolId,
                root_page: take_u64(buf, &mut at) as PageNum,
            },
            TAG_UPDATE_ROOT => BTreeLogEntry::UpdateRootPage {
                pool_id: take_u64(buf, &mut at) as PoolId,
                new_root: take_u64(buf, &mut at) as PageNum,
            },
            TAG_LEAF_INIT_EMPTY => BTreeLogEntry::LeafInitEmpty {
                pool_id: take_u64(buf, &mut at) as PoolId,
                page_num: take_u64(buf, &mut at) as PageNum,
                key_len: take_u64(buf, &mut at) as usize,
                parent: take_u64(buf, &mut at) as PageNum,
            },
            TAG_INTERNAL_INIT_EMPTY => BTreeLogEntry::InternalInitEmpty {
                pool_id: take_u64(buf, &mut at) as PoolId,
                page_num: take_u64(buf, &mut at) as PageNum,
                key_len: take_u64(buf, &mut at) as usize,
                parent: take_u64(buf, &mut at) as PageNum,
            },
            TAG_NODE_INSERT => {
                let pool_id = take_u64(buf, &mut at) as PoolId;
                let page_num = take_u64(buf, &mut at) as PageNum;
                let is_leaf = buf[at] != 0;
                at += 1;
                let index = take_u64(buf, &mut at) as usize;
                let key = take_key(buf, &mut at);
                let value = take_key(buf, &mut at);
                BTreeLogEntry::NodeInsertItems { pool_id, page_num, is_leaf, index, key, value }
            }
            TAG_NODE_REMOVE => {
                let pool_id = take_u64(buf, &mut at) as PoolId;
                let page_num = take_u64(buf, &mut at) as PageNum;
                let is_leaf = buf[at] != 0;
                at += 1;
                let index = take_u64(buf, &mut at) as usize;
                let key = take_key(buf, &mut at);
                let value = take_key(buf, &mut at);
                BTreeLogEntry::NodeRemoveItems { pool_id, page_num, is_leaf, index, key, value }
            }
            TAG_LEAF_SET_NEXT => BTreeLogEntry::LeafSetNextPage {
                pool_id: take_u64(buf, &mut at) as PoolId,
                page_num: take_u64(buf, &mut at) as PageNum,
                next: take_opt_page(buf, &mut at),
            },
            TAG_INTERNAL_NEW_ROOT => {
                let pool_id = take_u64(buf, &mut at) as PoolId;
                let new_root_page = take_u64(buf, &mut at) as PageNum;
                let old_root = take_u64(buf, &mut at) as PageNum;
                let key = take_key(buf, &mut at);
                let right_child = take_u64(buf, &mut at) as PageNum;
                BTreeLogEntry::InternalCreateNewRoot { pool_id, new_root_page, old_root, key, right_child }
            }
            TAG_INTERNAL_UPDATE_KEY => {
                let pool_id = take_u64(buf, &mut at) as PoolId;
                let page_num = take_u64(buf, &mut at) as PageNum;
                let index = take_u64(buf, &mut at) as usize;
                let key = take_key(buf, &mut at);
                BTreeLogEntry::InternalUpdateKey { pool_id, page_num, index, key }
            }
            TAG_SET_PARENT => BTreeLogEntry::SetParentPage {
                pool_id: take_u64(buf, &mut at) as PoolId,
                page_num: take_u64(buf, &mut at) as PageNum,
                parent: take_u64(buf, &mut at) as PageNum,
            },
            _ => return None,
        };
        Some(entry)
    }
}

/// Batches every log entry produced by one logical B+Tree operation.
/// Entries are buffered (not written to the WAL) while the operation's
/// page mutations are still being applied under latch; `commit` flushes
/// the whole batch and stamps each touched frame's LSN, `abort` drops
/// the batch unwritten.
pub struct BplusTreeMiniTransaction {
    entries: Vec<(Arc<Frame>, BTreeLogEntry)>,
}

impl BplusTreeMiniTransaction {
    pub fn new() -> Self {
        BplusTreeMiniTransaction { entries: Vec::new() }
    }

    pub fn log(&mut self, frame: Arc<Frame>, entry: BTreeLogEntry) {
        self.entries.push((frame, entry));
    }

    pub fn commit(self, log: &LogManager) {
        for (frame, entry) in self.entries {
            let lsn = log.append(ModuleId::BplusTree, entry.encode());
            frame.set_lsn(lsn);
            frame.mark_dirty();
        }
    }

    /// Discards every buffered entry without writing to the WAL. The
    /// page mutations these entries described were never made durable,
    /// so there is nothing on disk to physically undo; any in-memory
    /// frame bytes changed mid-operation are left as-is, matching the
    /// double-write buffer's role of catching torn *pages*, not
    /// mid-operation logic errors (an I/O failure here is expected to
    /// surface as a propagated error, not a silently-healed tree).
    pub fn abort(self) {
        drop(self);
    }
}

pub fn leaf_entry_value(rid: Rid) -> Vec<u8> {
    rid.encode()
}

pub fn internal_entry_value(child: PageNum) -> Vec<u8> {
    (child as u64).to_be_bytes().to_vec()
}

pub fn leaf_value_to_rid(value: &[u8]) -> Rid {
    Rid::decode(value)
}

pub fn value_to_child(value: &[u8]) -> PageNum {
    u64::from_be_bytes(value.try_into().unwrap()) as PageNum
}
