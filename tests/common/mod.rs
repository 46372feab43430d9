use std::path::PathBuf;
use std::sync::Arc;

use crate_db::buffer_pool::BufferPool;
use crate_db::config::StorageConfig;
use crate_db::double_write::DoubleWriteBuffer;
use crate_db::index::btree::BTree;
use crate_db::record::file::RecordFile;
use crate_db::wal::manager::LogManager;

pub fn init_log() {
    crate_db::util::init_log();
}

/// A bare-subsystem harness for tests that exercise the record manager
/// or B+Tree directly (rather than through `Database::open`'s catalog of
/// named tables), mirroring `tests/common.rs`'s `setup()`.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub buffer_pool: Arc<BufferPool>,
    pub log: Arc<LogManager>,
}

impl Harness {
    pub fn new(config: &StorageConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = Arc::new(crate_db::buffer_pool::FileTable::new(config.page_size));
        let double_write = Arc::new(
            DoubleWriteBuffer::open(&dir.path().join("dwb.bin"), config.page_size, config.double_write_threshold)
                .expect("open double-write buffer"),
        );
        double_write.bind_files(Arc::downgrade(&files));
        let log = LogManager::open(dir.path(), config).expect("open log manager");
        let buffer_pool = Arc::new(BufferPool::new(config.page_size, config.buffer_pool_frames, files, double_write, log.clone()));
        Harness { dir, buffer_pool, log }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Registers a fresh pool id's data file and burns page 0 as the
    /// buffer-pool file header, the convention `Database::open` follows
    /// for every table/index it creates.
    pub fn new_pool(&self, pool_id: u32, name: &str) -> std::io::Result<()> {
        self.buffer_pool.register_file(pool_id, &self.path(name)).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        let hdr = self.buffer_pool.allocate_page(pool_id).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        self.buffer_pool.unpin(&hdr);
        Ok(())
    }

    pub fn record_file(&self, pool_id: u32, record_size: usize) -> RecordFile {
        RecordFile::new(pool_id, record_size, Arc::clone(&self.buffer_pool), Arc::clone(&self.log))
    }

    pub fn btree(&self, pool_id: u32, key_len: usize) -> Arc<BTree> {
        // Index files additionally need page 1 materialized before
        // `BTree::open` bootstraps the header/root there.
        let hdr = self.buffer_pool.allocate_page(pool_id).expect("allocate catalog page");
        self.buffer_pool.unpin(&hdr);
        BTree::open(pool_id, key_len, Arc::clone(&self.buffer_pool), Arc::clone(&self.log)).expect("open btree")
    }
}

pub fn key(n: i32) -> Vec<u8> {
    n.to_be_bytes().to_vec()
}

/// Opens a fresh buffer pool + WAL over an existing data directory,
/// independent of any prior session's in-memory state — used to simulate
/// a restart after a crash, where only what made it to disk survives.
pub fn reopen(dir: &std::path::Path, config: &StorageConfig) -> (Arc<BufferPool>, Arc<LogManager>) {
    let files = Arc::new(crate_db::buffer_pool::FileTable::new(config.page_size));
    let double_write = Arc::new(
        DoubleWriteBuffer::open(&dir.join("dwb.bin"), config.page_size, config.double_write_threshold).expect("open double-write buffer"),
    );
    double_write.bind_files(Arc::downgrade(&files));
    let log = LogManager::open(dir, config).expect("open log manager");
    let buffer_pool = Arc::new(BufferPool::new(config.page_size, config.buffer_pool_frames, files, double_write, log.clone()));
    (buffer_pool, log)
}
