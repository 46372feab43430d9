//! In-memory, append-only queue of not-yet-flushed log entries.
//!
//! An append-only queue of entries with a capped byte budget; producers
//! block briefly when the budget is exceeded. Append assigns the next
//! LSN under a mutex and stamps the entry. Grounded on the byte-budget
//! behavior documented in `original_source/.../clog/log_buffer.cpp`'s
//! `max_bytes` parameter, reproduced here with a `Condvar` instead of the
//! busy loop the flusher itself used downstream.

use crate::page::Lsn;
use crate::wal::entry::{LogEntry, ModuleId};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering::SeqCst};

struct State {
    queue: VecDeque<LogEntry>,
    bytes: usize,
    running: bool,
}

pub struct LogEntryBuffer {
    state: Mutex<State>,
    space_available: Condvar,
    entry_available: Condvar,
    byte_budget: usize,
    next_lsn: AtomicU64,
}

impl LogEntryBuffer {
    pub fn new(byte_budget: usize) -> Self {
        LogEntryBuffer {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                bytes: 0,
                running: true,
            }),
            space_available: Condvar::new(),
            entry_available: Condvar::new(),
            byte_budget,
            next_lsn: AtomicU64::new(1),
        }
    }

    /// Appends a new entry, assigning it the next LSN. Blocks while the
    /// buffer's byte budget is exceeded, so a burst of large payloads
    /// cannot grow memory use without bound while the flusher thread is
    /// behind.
    pub fn append(&self, module_id: ModuleId, payload: Vec<u8>) -> Lsn {
        let mut entry = LogEntry::new(module_id, payload);
        let mut state = self.state.lock();
        while state.bytes + entry.encoded_len() > self.byte_budget && !state.queue.is_empty() {
            self.space_available.wait(&mut state);
        }
        let lsn = self.next_lsn.fetch_add(1, SeqCst);
        entry.lsn = lsn;
        state.bytes += entry.encoded_len();
        state.queue.push_back(entry);
        self.entry_available.notify_one();
        lsn
    }

    /// Used by recovery to resume LSN allocation after the highest LSN
    /// found on disk, so a freshly-recovered engine never reuses an LSN.
    pub fn fast_forward(&self, lsn: Lsn) {
        let mut current = self.next_lsn.load(SeqCst);
        while current <= lsn {
            match self.next_lsn.compare_exchange(
                current,
                lsn + 1,
                SeqCst,
                SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Blocks until an entry is available or the buffer has been shut
    /// down and drained. Entries are always returned in LSN order because
    /// they are pushed in append order and `append` assigns LSNs under
    /// the same lock.
    pub fn pop_next(&self) -> Option<LogEntry> {
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.queue.pop_front() {
                state.bytes -= entry.encoded_len();
                self.space_available.notify_all();
                return Some(entry);
            }
            if !state.running {
                return None;
            }
            self.entry_available.wait(&mut state);
        }
    }

    /// Signals the flusher thread to drain the remaining queue and exit;
    /// does not discard anything already queued.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.running = false;
        self.entry_available.notify_all();
    }
}
