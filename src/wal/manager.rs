//! The log handler: owns the in-memory buffer, the background flusher
//! thread, and `wait_lsn`. Implements [`crate::buffer_pool::DurabilityHook`]
//! so the buffer pool can block on durability before overwriting a page's
//! disk image.
//!
//! Grounded on `src/tx_log/log_manager.rs`'s role as the single owner of
//! the append cursor, with a full contract: LSN
//! assignment, a background flusher that rolls to the next file on
//! capacity, and `wait_lsn`.

use crate::buffer_pool::DurabilityHook;
use crate::config::StorageConfig;
use crate::error::StorageResult;
use crate::page::Lsn;
use crate::wal::buffer::LogEntryBuffer;
use crate::wal::entry::{LogEntry, ModuleId};
use crate::wal::file::{LogFileManager, LogFileWriter};
use log::{debug, error, warn};
use parking_lot::{Condvar, Mutex};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

struct FlushState {
    flushed_lsn: Lsn,
}

pub struct LogManager {
    buffer: Arc<LogEntryBuffer>,
    files: Arc<LogFileManager>,
    flush_state: Arc<(Mutex<FlushState>, Condvar)>,
    running: Arc<AtomicBool>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl LogManager {
    pub fn open(dir: &Path, config: &StorageConfig) -> StorageResult<Arc<Self>> {
        let files = Arc::new(LogFileManager::new(dir, config.wal_entries_per_file)?);
        let buffer = Arc::new(LogEntryBuffer::new(config.wal_buffer_byte_budget));

        // Resume LSN allocation past whatever is already on disk.
        let mut max_lsn = 0;
        for start in files.all_start_lsns()? {
            if let Ok(reader) = files.open_reader(start) {
                for entry in reader {
                    max_lsn = max_lsn.max(entry.lsn);
                }
            }
        }
        buffer.fast_forward(max_lsn);

        let manager = Arc::new(LogManager {
            buffer,
            files,
            flush_state: Arc::new((Mutex::new(FlushState { flushed_lsn: max_lsn }), Condvar::new())),
            running: Arc::new(AtomicBool::new(true)),
            flusher: Mutex::new(None),
        });
        manager.spawn_flusher();
        Ok(manager)
    }

    fn spawn_flusher(self: &Arc<Self>) {
        let buffer = Arc::clone(&self.buffer);
        let files = Arc::clone(&self.files);
        let flush_state = Arc::clone(&self.flush_state);
        let running = Arc::clone(&self.running);

        let handle = std::thread::spawn(move || {
            let capacity = files.capacity();
            let mut writer: Option<LogFileWriter> = files
                .last_file()
                .ok()
                .flatten()
                .and_then(|start| files.open_writer(start).ok());

            while running.load(SeqCst) {
                let entry = match buffer.pop_next() {
                    Some(e) => e,
                    None => break,
                };
                Self::write_with_retry(&files, &mut writer, &entry, capacity);

                let (lock, cv) = &*flush_state;
                let mut state = lock.lock();
                state.flushed_lsn = state.flushed_lsn.max(entry.lsn);
                cv.notify_all();
            }

            // Drain whatever is left once `running` goes false, so no
            // durable entry is lost on shutdown.
            while let Some(entry) = buffer.pop_next() {
                Self::write_with_retry(&files, &mut writer, &entry, capacity);
                let (lock, cv) = &*flush_state;
                let mut state = lock.lock();
                state.flushed_lsn = state.flushed_lsn.max(entry.lsn);
                cv.notify_all();
            }
        });
        *self.flusher.lock() = Some(handle);
    }

    /// I/O errors on WAL writes are retried with a short sleep rather
    /// than propagated.
    fn write_with_retry(
        files: &LogFileManager,
        writer: &mut Option<LogFileWriter>,
        entry: &LogEntry,
        capacity: usize,
    ) {
        loop {
            if writer.is_none() || writer.as_ref().unwrap().is_full(capacity) {
                match files.open_writer(entry.lsn) {
                    Ok(w) => *writer = Some(w),
                    Err(e) => {
                        warn!("wal: failed to open next log file, retrying: {}", e);
                        std::thread::sleep(Duration::from_millis(50));
                        continue;
                    }
                }
            }
            match writer.as_mut().unwrap().append(entry, capacity) {
                Ok(()) => {
                    debug!("wal: appended lsn={}", entry.lsn);
                    return;
                }
                Err(e) => {
                    error!("wal: append failed, retrying: {}", e);
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    pub fn append(&self, module_id: ModuleId, payload: Vec<u8>) -> Lsn {
        self.buffer.append(module_id, payload)
    }

    pub fn files(&self) -> &LogFileManager {
        &self.files
    }

    pub fn shutdown(&self) {
        self.running.store(false, SeqCst);
        self.buffer.shutdown();
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
    }

    /// Iterates every log entry from `start_lsn` onward, in LSN order,
    /// across all on-disk files. Used by the integrated replayer.
    pub fn replay_from(&self, start_lsn: Lsn) -> StorageResult<Vec<LogEntry>> {
        let mut out = Vec::new();
        for file_start in self.files.list_files(start_lsn)? {
            let reader = self.files.open_reader(file_start)?.skip_below(start_lsn);
            for entry in reader {
                out.push(entry);
            }
        }
        out.sort_by_key(|e| e.lsn);
        Ok(out)
    }
}

impl DurabilityHook for LogManager {
    fn wait_lsn(&self, lsn: Lsn) {
        if lsn == 0 {
            return;
        }
        let (lock, cv) = &*self.flush_state;
        let mut state = lock.lock();
        while state.flushed_lsn < lsn {
            cv.wait(&mut state);
        }
    }
}
