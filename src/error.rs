//! Crate-wide error type.
//!
//! The storage engine reports failures through a small result-code style
//! enum rather than a tree of `From`-convertible error types: every
//! subsystem (buffer pool, WAL, record manager, B+Tree, MVCC) maps its
//! failures onto one of these classes, matching how callers are expected
//! to react (retry, roll back, propagate).

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum StorageError {
    // I/O
    IoOpen(String),
    IoRead(String),
    IoWrite(String),
    IoSeek(String),
    IoCreate(String),
    IoClose(String),
    IoRemove(String),

    // buffer pool
    BufferPoolOpen(String),
    BufferPoolFull,
    InvalidPageNum(usize),

    // schema / catalog
    DbExists(String),
    DbNotOpened(String),
    TableExists(String),
    FieldMissing(String),

    // record manager
    RecordNotExist,
    DuplicateKey,
    InvalidRid,
    RecordEof,

    // WAL
    LogFileFull,
    LogEntryInvalid(String),

    // B+Tree
    TreeEmpty,
    LockedNeedWait,

    Internal(String),
    Unimplemented(&'static str),
    InvalidArgument(String),
    NoMem,
    Locked(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::IoOpen(m) => write!(f, "io error opening file: {}", m),
            StorageError::IoRead(m) => write!(f, "io error reading: {}", m),
            StorageError::IoWrite(m) => write!(f, "io error writing: {}", m),
            StorageError::IoSeek(m) => write!(f, "io error seeking: {}", m),
            StorageError::IoCreate(m) => write!(f, "io error creating file: {}", m),
            StorageError::IoClose(m) => write!(f, "io error closing file: {}", m),
            StorageError::IoRemove(m) => write!(f, "io error removing file: {}", m),
            StorageError::BufferPoolOpen(m) => write!(f, "buffer pool open failed: {}", m),
            StorageError::BufferPoolFull => write!(f, "no free buffer"),
            StorageError::InvalidPageNum(n) => write!(f, "invalid page number: {}", n),
            StorageError::DbExists(m) => write!(f, "database already exists: {}", m),
            StorageError::DbNotOpened(m) => write!(f, "database not opened: {}", m),
            StorageError::TableExists(m) => write!(f, "table already exists: {}", m),
            StorageError::FieldMissing(m) => write!(f, "field missing: {}", m),
            StorageError::RecordNotExist => write!(f, "record does not exist"),
            StorageError::DuplicateKey => write!(f, "duplicate key"),
            StorageError::InvalidRid => write!(f, "invalid rid"),
            StorageError::RecordEof => write!(f, "end of records"),
            StorageError::LogFileFull => write!(f, "log file full"),
            StorageError::LogEntryInvalid(m) => write!(f, "invalid log entry: {}", m),
            StorageError::TreeEmpty => write!(f, "tree is empty"),
            StorageError::LockedNeedWait => write!(f, "locked, need wait"),
            StorageError::Internal(m) => write!(f, "internal error: {}", m),
            StorageError::Unimplemented(m) => write!(f, "unimplemented: {}", m),
            StorageError::InvalidArgument(m) => write!(f, "invalid argument: {}", m),
            StorageError::NoMem => write!(f, "out of memory"),
            StorageError::Locked(m) => write!(f, "locked: {}", m),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::IoRead(e.to_string())
    }
}

/// Assertion failures in latch accounting are a protocol violation, not a
/// recoverable error: the caller already broke the latching contract, so we
/// fail loudly rather than returning a `StorageError` the caller might
/// swallow.
#[macro_export]
macro_rules! latch_assert {
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            log::error!($($arg)*);
            panic!($($arg)*);
        }
    };
}
