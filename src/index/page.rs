//! B+Tree node layout: a small header followed by a dense, sorted array
//! of entries — `(key, rid)` pairs for a leaf, `(key, child_page)` pairs
//! for an internal node (slot 0's key is a dummy, only its child matters).
//!
//! Unlike the heap's bitmap-indexed slots (`crate::record::page`), B+Tree
//! slots are kept packed and sorted at all times. Grounded on
//! `src/btree/page/leaf_page.rs` and
//! `internal_page.rs`'s header fields (parent pointer, sibling pointer),
//! replacing their bitmap-of-fixed-slots layout with a packed array more
//! suited to a binary-search comparator that breaks ties on RID.

use std::convert::TryInto;
use crate::error::{StorageError, StorageResult};
use crate::page::PageNum;
use crate::record::rid::Rid;

pub const HEADER_LEN: usize = 1 + 8 + 4 + 8 + 4;
const NO_PAGE: u64 = 0;

#[derive(Debug, Clone, Copy)]
pub struct NodeHeader {
    pub is_leaf: bool,
    pub parent_page_num: PageNum,
    pub size: usize,
    /// Leaf only: the next leaf in sorted order, `None` for the
    /// rightmost leaf. Unused (always `None`) for internal nodes.
    pub next_brother: Option<PageNum>,
    pub key_len: usize,
}

impl NodeHeader {
    fn read(bytes: &[u8]) -> Self {
        let is_leaf = bytes[0] != 0;
        let parent_page_num = u64::from_be_bytes(bytes[1..9].try_into().unwrap()) as PageNum;
        let size = u32::from_be_bytes(bytes[9..13].try_into().unwrap()) as usize;
        let next = u64::from_be_bytes(bytes[13..21].try_into().unwrap());
        let key_len = u32::from_be_bytes(bytes[21..25].try_into().unwrap()) as usize;
        NodeHeader {
            is_leaf,
            parent_page_num,
            size,
            next_brother: if next == NO_PAGE { None } else { Some(next as PageNum) },
            key_len,
        }
    }

    fn write(&self, bytes: &mut [u8]) {
        bytes[0] = self.is_leaf as u8;
        bytes[1..9].copy_from_slice(&(self.parent_page_num as u64).to_be_bytes());
        bytes[9..13].copy_from_slice(&(self.size as u32).to_be_bytes());
        let next = self.next_brother.map(|p| p as u64).unwrap_or(NO_PAGE);
        bytes[13..21].copy_from_slice(&next.to_be_bytes());
        bytes[21..25].copy_from_slice(&(self.key_len as u32).to_be_bytes());
    }

    pub fn leaf_slot_len(&self) -> usize {
        self.key_len + Rid::ENCODED_LEN
    }

    pub fn internal_slot_len(&self) -> usize {
        self.key_len + 8
    }

    fn slot_len(&self) -> usize {
        if self.is_leaf {
            self.leaf_slot_len()
        } else {
            self.internal_slot_len()
        }
    }
}

pub fn header(bytes: &[u8]) -> NodeHeader {
    NodeHeader::read(bytes)
}

fn set_size(bytes: &mut [u8], size: usize) {
    let mut h = header(bytes);
    h.size = size;
    h.write(bytes);
}

pub fn set_parent_page(bytes: &mut [u8], parent: PageNum) {
    let mut h = header(bytes);
    h.parent_page_num = parent;
    h.write(bytes);
}

pub fn set_next_brother(bytes: &mut [u8], next: Option<PageNum>) {
    let mut h = header(bytes);
    h.next_brother = next;
    h.write(bytes);
}

/// The largest `size` a node of this `key_len` can hold on a page of
/// `page_size` bytes.
pub fn max_size(page_size: usize, key_len: usize, is_leaf: bool) -> usize {
    let slot_len = if is_leaf { key_len + Rid::ENCODED_LEN } else { key_len + 8 };
    (page_size - HEADER_LEN) / slot_len
}

/// Half of `max_size`, rounded up; every non-root node must hold at
/// least this many entries after a mutation.
pub fn min_size(page_size: usize, key_len: usize, is_leaf: bool) -> usize {
    let max = max_size(page_size, key_len, is_leaf);
    max - max / 2
}

pub fn init_leaf(bytes: &mut [u8], key_len: usize, parent: PageNum) {
    let h = NodeHeader {
        is_leaf: true,
        parent_page_num: parent,
        size: 0,
        next_brother: None,
        key_len,
    };
    h.write(bytes);
}

pub fn init_internal(bytes: &mut [u8], key_len: usize, parent: PageNum) {
    let h = NodeHeader {
        is_leaf: false,
        parent_page_num: parent,
        size: 0,
        next_brother: None,
        key_len,
    };
    h.write(bytes);
}

fn slot_at(h: &NodeHeader, i: usize) -> std::ops::Range<usize> {
    let start = HEADER_LEN + i * h.slot_len();
    start..start + h.slot_len()
}

pub fn leaf_key_at<'a>(bytes: &'a [u8], i: usize) -> &'a [u8] {
    let h = header(bytes);
    let r = slot_at(&h, i);
    &bytes[r.start..r.start + h.key_len]
}

pub fn leaf_rid_at(bytes: &[u8], i: usize) -> Rid {
    let h = header(bytes);
    let r = slot_at(&h, i);
    Rid::decode(&bytes[r.start + h.key_len..r.end])
}

/// Binary search for `key`/`rid` using the full comparator (key, then
/// RID tiebreak). Returns `Ok(i)` if an exact match sits at `i`, or
/// `Err(i)` for the sorted insertion point.
pub fn leaf_find(bytes: &[u8], key: &[u8], rid: Rid) -> Result<usize, usize> {
    let h = header(bytes);
    let mut lo = 0usize;
    let mut hi = h.size;
    while lo < hi {
        let mid = (lo + hi) / 2;
        let mid_key = leaf_key_at(bytes, mid);
        let ord = mid_key.cmp(key).then_with(|| leaf_rid_at(bytes, mid).cmp(&rid));
        match ord {
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
            std::cmp::Ordering::Equal => return Ok(mid),
        }
    }
    Err(lo)
}

/// The first slot whose key is `>= key`, or `None` if every entry is
/// smaller (the scan should move to the next leaf). Used by range scans
/// to find their starting position without needing an exact RID match.
pub fn leaf_find_first_key(bytes: &[u8], key: &[u8]) -> Option<usize> {
    let h = header(bytes);
    let mut lo = 0usize;
    let mut hi = h.size;
    while lo < hi {
        let mid = (lo + hi) / 2;
        if leaf_key_at(bytes, mid) < key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo < h.size { Some(lo) } else { None }
}

pub fn leaf_insert_at(bytes: &mut [u8], i: usize, key: &[u8], rid: Rid) -> StorageResult<()> {
    let h = header(bytes);
    if h.size >= max_size(bytes.len(), h.key_len, true) {
        return Err(StorageError::Internal("leaf node full".into()));
    }
    let slot_len = h.leaf_slot_len();
    let tail_start = HEADER_LEN + i * slot_len;
    let tail_end = HEADER_LEN + h.size * slot_len;
    bytes.copy_within(tail_start..tail_end, tail_start + slot_len);
    bytes[tail_start..tail_start + h.key_len].copy_from_slice(key);
    bytes[tail_start + h.key_len..tail_start + slot_len].copy_from_slice(&rid.encode());
    set_size(bytes, h.size + 1);
    Ok(())
}

pub fn leaf_remove_at(bytes: &mut [u8], i: usize) {
    let h = header(bytes);
    let slot_len = h.leaf_slot_len();
    let tail_start = HEADER_LEN + (i + 1) * slot_len;
    let tail_end = HEADER_LEN + h.size * slot_len;
    bytes.copy_within(tail_start..tail_end, HEADER_LEN + i * slot_len);
    set_size(bytes, h.size - 1);
}

pub fn internal_child_at(bytes: &[u8], i: usize) -> PageNum {
    let h = header(bytes);
    let r = slot_at(&h, i);
    u64::from_be_bytes(bytes[r.start + h.key_len..r.end].try_into().unwrap()) as PageNum
}

pub fn internal_key_at<'a>(bytes: &'a [u8], i: usize) -> &'a [u8] {
    let h = header(bytes);
    let r = slot_at(&h, i);
    &bytes[r.start..r.start + h.key_len]
}

pub fn internal_set_child(bytes: &mut [u8], i: usize, child: PageNum) {
    let h = header(bytes);
    let r = slot_at(&h, i);
    bytes[r.start + h.key_len..r.end].copy_from_slice(&(child as u64).to_be_bytes());
}

/// `lookup(key)`: the largest slot `i` in `[1, size)` with `key(i) <=
/// search_key`, or `0` if every real key exceeds it.
pub fn internal_lookup_child_index(bytes: &[u8], key: &[u8]) -> usize {
    let h = header(bytes);
    let mut result = 0;
    for i in 1..h.size {
        if internal_key_at(bytes, i) <= key {
            result = i;
        } else {
            break;
        }
    }
    result
}

pub fn internal_insert_at(bytes: &mut [u8], i: usize, key: &[u8], child: PageNum) -> StorageResult<()> {
    let h = header(bytes);
    if h.size >= max_size(bytes.len(), h.key_len, false) {
        return Err(StorageError::Internal("internal node full".into()));
    }
    let slot_len = h.internal_slot_len();
    let tail_start = HEADER_LEN + i * slot_len;
    let tail_end = HEADER_LEN + h.size * slot_len;
    bytes.copy_within(tail_start..tail_end, tail_start + slot_len);
    bytes[tail_start..tail_start + h.key_len].copy_from_slice(key);
    bytes[tail_start + h.key_len..tail_start + slot_len].copy_from_slice(&(child as u64).to_be_bytes());
    set_size(bytes, h.size + 1);
    Ok(())
}

pub fn internal_remove_at(bytes: &mut [u8], i: usize) {
    let h = header(bytes);
    let slot_len = h.internal_slot_len();
    let tail_start = HEADER_LEN + (i + 1) * slot_len;
    let tail_end = HEADER_LEN + h.size * slot_len;
    bytes.copy_within(tail_start..tail_end, HEADER_LEN + i * slot_len);
    set_size(bytes, h.size - 1);
}

/// True when this node may absorb one more entry without splitting —
/// the crabbing descent's safety predicate for INSERT.
pub fn is_safe_for_insert(bytes: &[u8]) -> bool {
    let h = header(bytes);
    h.size < max_size(bytes.len(), h.key_len, h.is_leaf)
}

/// The crabbing descent's safety predicate for DELETE, with the root's
/// special-cased thresholds.
pub fn is_safe_for_delete(bytes: &[u8], is_root: bool) -> bool {
    let h = header(bytes);
    if is_root {
        if h.is_leaf {
            h.size > 1
        } else {
            h.size > 2
        }
    } else {
        h.size > min_size(bytes.len(), h.key_len, h.is_leaf)
    }
}
