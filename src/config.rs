//! Engine configuration, passed explicitly into [`crate::database::Database::open`].
//!
//! There is
//! deliberately no process-wide mutable config singleton: the storage
//! engine's internal subsystems (buffer pool, WAL, record manager) all take
//! a `&StorageConfig` (or the values copied out of one) at construction
//! time, not a global lookup.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxKitKind {
    /// No visibility bookkeeping at all; every row is visible to every
    /// reader. Used by tests that only exercise the heap/B+Tree layers.
    Vacuous,
    /// Hidden `trx_begin`/`trx_end` columns for snapshot visibility.
    Mvcc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogHandlerKind {
    /// Entries are accepted and immediately discarded; `wait_lsn` returns
    /// at once. Used by in-memory-only tests.
    Vacuous,
    /// Entries are appended to on-disk log files by a background flusher.
    Disk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadModel {
    OnePerConnection,
    Pool,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub trx_kit: TrxKitKind,
    pub log_handler: LogHandlerKind,
    pub thread_model: ThreadModel,
    /// Size in bytes of a page on disk and in the buffer pool.
    pub page_size: usize,
    /// Number of frames the buffer pool holds before it must evict.
    pub buffer_pool_frames: usize,
    /// Number of valid slots the double-write buffer accumulates before
    /// it flushes them all to their home pages.
    pub double_write_threshold: usize,
    /// Number of entries a single WAL file holds before the flusher opens
    /// the next one.
    pub wal_entries_per_file: usize,
    /// Soft byte budget for the in-memory log entry buffer; `append`
    /// blocks briefly once exceeded.
    pub wal_buffer_byte_budget: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            trx_kit: TrxKitKind::Mvcc,
            log_handler: LogHandlerKind::Disk,
            thread_model: ThreadModel::OnePerConnection,
            page_size: 8192,
            buffer_pool_frames: 256,
            double_write_threshold: 16,
            wal_entries_per_file: 1000,
            wal_buffer_byte_budget: 4 * 1024 * 1024,
        }
    }
}

impl StorageConfig {
    /// Config used by unit tests: small pools and thresholds so that
    /// eviction, splitting, and buffer-full paths are exercised without
    /// generating huge fixtures.
    pub fn for_test() -> Self {
        StorageConfig {
            trx_kit: TrxKitKind::Mvcc,
            log_handler: LogHandlerKind::Disk,
            thread_model: ThreadModel::OnePerConnection,
            page_size: 4096,
            buffer_pool_frames: 32,
            double_write_threshold: 4,
            wal_entries_per_file: 64,
            wal_buffer_byte_budget: 64 * 1024,
        }
    }
}
