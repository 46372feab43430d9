//! The buffer pool: pins, latches and evicts pages, fetching from disk
//! through the double-write buffer when absent, and routing dirty
//! writeback through it too.
//!
//! Grounded on `src/btree/buffer_pool.rs` (page-table-keyed-by-id shape)
//! and `src/bufferpool.rs` (the thread-safe `Arc<RwLock<..>>` frame
//! storage), with a full contract: `get_page`,
//! `allocate_page`, `unpin`, `dispose_page`, `flush_page`,
//! `flush_all_pages`, clock-style eviction, and the write-ahead rule
//! (`wait_lsn` before a dirty page may be evicted).

mod frame;

pub use frame::{Latch, ReadGuard, WriteGuard};

use crate::double_write::DoubleWriteBuffer;
use crate::error::{StorageError, StorageResult};
use crate::page::{Lsn, Page, PageId, PageNum, PoolId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64};
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;

/// Anything the buffer pool needs to ask "has the WAL entry protecting
/// this page's latest mutation reached disk yet?" before it is allowed to
/// overwrite the page's on-disk image. Implemented by
/// [`crate::wal::manager::LogManager`]; a no-op implementation backs tests
/// that don't exercise recovery.
pub trait DurabilityHook: Send + Sync {
    fn wait_lsn(&self, lsn: Lsn);
}

pub struct VacuousDurability;
impl DurabilityHook for VacuousDurability {
    fn wait_lsn(&self, _lsn: Lsn) {}
}

/// A buffer-pool slot caching exactly one page.
pub struct Frame {
    pub id: PageId,
    pin_count: AtomicI32,
    dirty: AtomicBool,
    pub latch: Latch,
    lsn: AtomicU64,
    recency: AtomicU64,
    page: Mutex<Page>,
}

impl Frame {
    fn new(page: Page, recency: u64) -> Self {
        let lsn = page.lsn;
        Frame {
            id: page.id,
            pin_count: AtomicI32::new(1),
            dirty: AtomicBool::new(false),
            latch: Latch::new(),
            lsn: AtomicU64::new(lsn),
            recency: AtomicU64::new(recency),
            page: Mutex::new(page),
        }
    }

    pub fn pin_count(&self) -> i32 {
        self.pin_count.load(SeqCst)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(SeqCst)
    }

    pub fn lsn(&self) -> Lsn {
        self.lsn.load(SeqCst)
    }

    pub fn set_lsn(&self, lsn: Lsn) {
        self.lsn.store(lsn, SeqCst);
        self.page.lock().lsn = lsn;
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, SeqCst);
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.page.lock().bytes())
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(self.page.lock().bytes_mut())
    }

    fn snapshot(&self) -> Page {
        self.page.lock().clone()
    }

    fn touch(&self, clock: u64) {
        self.recency.store(clock, SeqCst);
    }
}

pub(crate) struct DataFile {
    file: Mutex<File>,
    page_size: usize,
}

impl DataFile {
    fn open(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| StorageError::IoOpen(e.to_string()))?;
        Ok(DataFile {
            file: Mutex::new(file),
            page_size,
        })
    }

    fn page_count(&self) -> StorageResult<usize> {
        let file = self.file.lock();
        let len = file
            .metadata()
            .map_err(|e| StorageError::IoRead(e.to_string()))?
            .len() as usize;
        Ok(len / self.page_size)
    }

    pub(crate) fn read_page(&self, page_num: PageNum) -> StorageResult<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start((page_num * self.page_size) as u64))
            .map_err(|e| StorageError::IoSeek(e.to_string()))?;
        let mut buf = vec![0u8; self.page_size];
        file.read_exact(&mut buf)
            .map_err(|e| StorageError::IoRead(e.to_string()))?;
        Ok(buf)
    }

    pub(crate) fn write_page(&self, page_num: PageNum, bytes: &[u8]) -> StorageResult<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start((page_num * self.page_size) as u64))
            .map_err(|e| StorageError::IoSeek(e.to_string()))?;
        file.write_all(bytes)
            .map_err(|e| StorageError::IoWrite(e.to_string()))?;
        Ok(())
    }

    fn allocate(&self) -> StorageResult<PageNum> {
        let page_num = self.page_count()?;
        self.write_page(page_num, &vec![0u8; self.page_size])?;
        Ok(page_num)
    }
}

/// The set of open data files, shared between the buffer pool and the
/// double-write buffer: both need to turn a `PoolId` into somewhere to
/// read/write home pages, and neither should own the registry alone.
pub struct FileTable {
    page_size: usize,
    files: Mutex<HashMap<PoolId, Arc<DataFile>>>,
}

impl FileTable {
    pub fn new(page_size: usize) -> Self {
        FileTable {
            page_size,
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, pool_id: PoolId, path: &Path) -> StorageResult<()> {
        let file = DataFile::open(path, self.page_size)?;
        self.files.lock().insert(pool_id, Arc::new(file));
        Ok(())
    }

    pub(crate) fn get(&self, pool_id: PoolId) -> StorageResult<Arc<DataFile>> {
        self.files
            .lock()
            .get(&pool_id)
            .cloned()
            .ok_or(StorageError::InvalidPageNum(0))
    }

    pub(crate) fn write_home(&self, id: PageId, bytes: &[u8]) -> StorageResult<()> {
        self.get(id.pool_id)?.write_page(id.page_num, bytes)
    }

    pub(crate) fn read_home(&self, id: PageId) -> StorageResult<Vec<u8>> {
        self.get(id.pool_id)?.read_page(id.page_num)
    }
}

struct PageTable {
    frames: HashMap<PageId, Arc<Frame>>,
}

pub struct BufferPool {
    page_size: usize,
    capacity: usize,
    table: Mutex<PageTable>,
    files: Arc<FileTable>,
    double_write: Arc<DoubleWriteBuffer>,
    durability: Arc<dyn DurabilityHook>,
    clock: AtomicU64,
}

impl BufferPool {
    pub fn new(
        page_size: usize,
        capacity: usize,
        files: Arc<FileTable>,
        double_write: Arc<DoubleWriteBuffer>,
        durability: Arc<dyn DurabilityHook>,
    ) -> Self {
        BufferPool {
            page_size,
            capacity,
            table: Mutex::new(PageTable {
                frames: HashMap::new(),
            }),
            files,
            double_write,
            durability,
            clock: AtomicU64::new(0),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn register_file(&self, pool_id: PoolId, path: &Path) -> StorageResult<()> {
        self.files.register(pool_id, path)
    }

    fn file_of(&self, pool_id: PoolId) -> StorageResult<Arc<DataFile>> {
        self.files.get(pool_id)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, SeqCst)
    }

    /// Fetches a frame for `id`, pinning it. Faults the page in from disk
    /// (through the double-write buffer) if it is not already cached.
    pub fn get_page(&self, id: PageId) -> StorageResult<Arc<Frame>> {
        let mut table = self.table.lock();
        if let Some(frame) = table.frames.get(&id) {
            frame.pin_count.fetch_add(1, SeqCst);
            frame.touch(self.tick());
            return Ok(Arc::clone(frame));
        }

        let bytes = match self.double_write.recover_page(id)? {
            Some(bytes) => bytes,
            None => self.file_of(id.pool_id)?.read_page(id.page_num)?,
        };
        let page = Page::from_bytes(id, bytes, 0);
        let frame = Arc::new(Frame::new(page, self.tick()));
        self.evict_if_needed(&mut table)?;
        table.frames.insert(id, Arc::clone(&frame));
        Ok(frame)
    }

    /// Allocates a brand-new page at the end of `pool_id`'s file and
    /// returns it pinned with pin count 1.
    pub fn allocate_page(&self, pool_id: PoolId) -> StorageResult<Arc<Frame>> {
        let page_num = self.file_of(pool_id)?.allocate()?;
        let id = PageId::new(pool_id, page_num);
        let mut table = self.table.lock();
        self.evict_if_needed(&mut table)?;
        let frame = Arc::new(Frame::new(Page::new(id, self.page_size), self.tick()));
        table.frames.insert(id, Arc::clone(&frame));
        Ok(frame)
    }

    pub fn unpin(&self, frame: &Frame) {
        frame.pin_count.fetch_sub(1, SeqCst);
    }

    fn evict_if_needed(&self, table: &mut PageTable) -> StorageResult<()> {
        if table.frames.len() < self.capacity {
            return Ok(());
        }
        let victim = table
            .frames
            .values()
            .filter(|f| f.pin_count() == 0)
            .min_by_key(|f| f.recency.load(SeqCst))
            .cloned();
        let victim = victim.ok_or(StorageError::BufferPoolFull)?;
        if victim.is_dirty() {
            self.writeback(&victim)?;
        }
        table.frames.remove(&victim.id);
        Ok(())
    }

    /// The write-ahead rule: block until the WAL entry that produced this
    /// frame's LSN is durable, then stage the page through the
    /// double-write buffer before it touches its home location.
    fn writeback(&self, frame: &Frame) -> StorageResult<()> {
        self.durability.wait_lsn(frame.lsn());
        let page = frame.snapshot();
        self.double_write.stage(page)?;
        frame.dirty.store(false, SeqCst);
        Ok(())
    }

    pub fn flush_page(&self, id: PageId) -> StorageResult<()> {
        let table = self.table.lock();
        if let Some(frame) = table.frames.get(&id) {
            if frame.is_dirty() {
                self.writeback(frame)?;
            }
        }
        Ok(())
    }

    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let table = self.table.lock();
        for frame in table.frames.values() {
            if frame.is_dirty() {
                self.writeback(frame)?;
            }
        }
        Ok(())
    }

    /// Removes a page from the pool and frees its on-disk slot. The
    /// freed page is not reused by this call; the record manager's
    /// `free_pages` set owns page reuse policy.
    pub fn dispose_page(&self, id: PageId) -> StorageResult<()> {
        let mut table = self.table.lock();
        table.frames.remove(&id);
        Ok(())
    }

    /// Discards a page's in-memory copy without writeback. Used by
    /// transaction rollback to drop pages mutated by an aborted
    /// transaction.
    pub fn discard_page(&self, id: PageId) {
        self.table.lock().frames.remove(&id);
    }
}

pub fn default_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}
