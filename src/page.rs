//! Fixed-size page representation shared by every subsystem that stores
//! bytes on disk: the record manager's heap pages, the B+Tree's node
//! pages, and the buffer-pool/double-write-buffer machinery that moves
//! them between memory and disk.
//!
//! Grounded on `btree::page::page_id::BTreePageID` (identity) and the
//! `PageHeader`/checksum handling scattered through
//! `original_source/.../buffer/frame.cpp`, unified here into one `Page`
//! type so the buffer pool does not need a page-category-specific frame.

use crc32fast::Hasher;

pub type Lsn = u64;
pub type PoolId = u32;
pub type PageNum = usize;

/// Page 0 of every data file is the buffer-pool file header; page 1 is
/// reserved for whichever subsystem owns the file (record-manager catalog
/// page, or B+Tree index header page).
pub const FILE_HEADER_PAGE: PageNum = 0;
pub const CATALOG_PAGE: PageNum = 1;

/// Identifies one page uniquely across the whole engine: which buffer
/// pool (i.e. which open file) it belongs to, and its offset within that
/// file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub pool_id: PoolId,
    pub page_num: PageNum,
}

impl PageId {
    pub fn new(pool_id: PoolId, page_num: PageNum) -> Self {
        PageId { pool_id, page_num }
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pool={} page={}", self.pool_id, self.page_num)
    }
}

/// A fixed-size byte block plus the two pieces of metadata every
/// subsystem needs: the LSN of the last WAL entry that mutated it, and a
/// checksum over the data area computed on demand.
#[derive(Clone)]
pub struct Page {
    pub id: PageId,
    pub lsn: Lsn,
    data: Vec<u8>,
}

impl Page {
    pub fn new(id: PageId, page_size: usize) -> Self {
        Page {
            id,
            lsn: 0,
            data: vec![0u8; page_size],
        }
    }

    pub fn from_bytes(id: PageId, data: Vec<u8>, lsn: Lsn) -> Self {
        Page { id, lsn, data }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn checksum(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&self.data);
        hasher.finalize()
    }
}
