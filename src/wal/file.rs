//! On-disk WAL files: naming, the writer's append cursor, and the reader
//! used both by replay and by `list_files`.
//!
//! Grounded on `src/tx_log/log_manager.rs`'s on-disk cursor management,
//! with a file-per-LSN-window scheme: files are
//! named `<prefix><start_lsn><suffix>` and each holds entries whose LSN
//! falls in `[start, start + capacity)`.

use crate::error::{StorageError, StorageResult};
use crate::page::Lsn;
use crate::wal::entry::LogEntry;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const PREFIX: &str = "wal-";
const SUFFIX: &str = ".log";

pub struct LogFileManager {
    dir: PathBuf,
    capacity: usize,
}

impl LogFileManager {
    pub fn new(dir: &Path, capacity: usize) -> StorageResult<Self> {
        fs::create_dir_all(dir).map_err(|e| StorageError::IoCreate(e.to_string()))?;
        Ok(LogFileManager {
            dir: dir.to_path_buf(),
            capacity,
        })
    }

    fn path_for_start(&self, start_lsn: Lsn) -> PathBuf {
        self.dir.join(format!("{}{:020}{}", PREFIX, start_lsn, SUFFIX))
    }

    fn parse_start_lsn(name: &str) -> Option<Lsn> {
        let name = name.strip_prefix(PREFIX)?;
        let name = name.strip_suffix(SUFFIX)?;
        name.parse().ok()
    }

    /// All file start-LSNs currently on disk, ascending.
    pub fn all_start_lsns(&self) -> StorageResult<Vec<Lsn>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| StorageError::IoRead(e.to_string()))? {
            let entry = entry.map_err(|e| StorageError::IoRead(e.to_string()))?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(start) = Self::parse_start_lsn(name) {
                    out.push(start);
                }
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    /// Files whose `[start, start + capacity)` window overlaps
    /// `[from_lsn, +inf)`.
    pub fn list_files(&self, from_lsn: Lsn) -> StorageResult<Vec<Lsn>> {
        Ok(self
            .all_start_lsns()?
            .into_iter()
            .filter(|start| start + self.capacity as u64 > from_lsn)
            .collect())
    }

    pub fn last_file(&self) -> StorageResult<Option<Lsn>> {
        Ok(self.all_start_lsns()?.into_iter().last())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Opens a file for appending, picking up its existing entry count so a
    /// reopen across a restart (`LogManager::spawn_flusher` reopens the last
    /// on-disk file rather than always starting fresh) doesn't reset the
    /// cursor and let the file grow past its declared `[start, start +
    /// capacity)` window.
    pub fn open_writer(&self, start_lsn: Lsn) -> StorageResult<LogFileWriter> {
        let path = self.path_for_start(start_lsn);
        let entries_written = if path.exists() { self.open_reader(start_lsn)?.count() } else { 0 };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::IoOpen(e.to_string()))?;
        Ok(LogFileWriter {
            start_lsn,
            file,
            entries_written,
        })
    }

    pub fn open_reader(&self, start_lsn: Lsn) -> StorageResult<LogFileReader> {
        let path = self.path_for_start(start_lsn);
        let mut file = File::open(&path).map_err(|e| StorageError::IoOpen(e.to_string()))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| StorageError::IoRead(e.to_string()))?;
        Ok(LogFileReader {
            start_lsn,
            buf,
            cursor: 0,
        })
    }
}

pub struct LogFileWriter {
    pub start_lsn: Lsn,
    file: File,
    entries_written: usize,
}

impl LogFileWriter {
    /// Appends one entry. Returns `Err(LogFileFull)` once the file's
    /// entry cap is reached — the caller (the flusher) must then open
    /// the next file.
    pub fn append(&mut self, entry: &LogEntry, capacity: usize) -> StorageResult<()> {
        if self.entries_written >= capacity {
            return Err(StorageError::LogFileFull);
        }
        self.file
            .write_all(&entry.encode())
            .map_err(|e| StorageError::IoWrite(e.to_string()))?;
        self.file
            .flush()
            .map_err(|e| StorageError::IoWrite(e.to_string()))?;
        self.entries_written += 1;
        Ok(())
    }

    pub fn is_full(&self, capacity: usize) -> bool {
        self.entries_written >= capacity
    }
}

pub struct LogFileReader {
    pub start_lsn: Lsn,
    buf: Vec<u8>,
    cursor: usize,
}

impl Iterator for LogFileReader {
    type Item = LogEntry;

    /// Stops on EOF or on an entry whose declared payload size runs past
    /// what remains — both are treated as the tail marker of a partially
    /// written entry from a crash, not an error.
    fn next(&mut self) -> Option<Self::Item> {
        let (entry, consumed) = LogEntry::decode(&self.buf[self.cursor..])?;
        self.cursor += consumed;
        Some(entry)
    }
}

impl LogFileReader {
    /// Skips entries whose LSN is below `from_lsn` without returning
    /// them — used when replay starts mid-file.
    pub fn skip_below(mut self, from_lsn: Lsn) -> Self {
        while let Some((entry, consumed)) = LogEntry::decode(&self.buf[self.cursor..]) {
            if entry.lsn >= from_lsn {
                break;
            }
            self.cursor += consumed;
        }
        self
    }
}
