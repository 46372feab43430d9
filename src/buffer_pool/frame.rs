//! Per-frame reader-writer latch with a recursive write side.
//!
//! Invariants: the write latch is exclusive, the read latch shared; the
//! write latch is re-entrant for the same holder, tracked with a counter;
//! acquiring a read latch while holding the write latch (or vice versa)
//! from the same thread is a programmer error, detected at runtime.
//!
//! `std::sync::RwLock` and `parking_lot::RwLock` are both non-reentrant, so
//! the latch is hand-rolled on top of `parking_lot::{Mutex, Condvar}`,
//! the same way a condition-variable wait loop is hand-rolled around a
//! borrowed lock type elsewhere in this codebase.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::thread::{self, ThreadId};

struct LatchState {
    writer: Option<ThreadId>,
    write_count: u32,
    // Per-holder reader counts. Kept unconditionally (not just in debug
    // builds) because `try_read_latch`'s self-deadlock check needs it, but
    // the crate only uses it for assertions, not production logic.
    readers: HashMap<ThreadId, u32>,
}

pub struct Latch {
    state: Mutex<LatchState>,
    cv: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Latch {
            state: Mutex::new(LatchState {
                writer: None,
                write_count: 0,
                readers: HashMap::new(),
            }),
            cv: Condvar::new(),
        }
    }

    pub fn write_lock(&self) -> WriteGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        crate::latch_assert!(
            !state.readers.contains_key(&me) || state.writer == Some(me),
            "programmer error: thread {:?} acquiring write latch while holding read latch",
            me
        );
        loop {
            if state.writer == Some(me) {
                state.write_count += 1;
                break;
            }
            if state.writer.is_none() && state.readers.is_empty() {
                state.writer = Some(me);
                state.write_count = 1;
                break;
            }
            self.cv.wait(&mut state);
        }
        WriteGuard { latch: self }
    }

    pub fn try_write_lock(&self) -> Option<WriteGuard<'_>> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.writer == Some(me) {
            state.write_count += 1;
            return Some(WriteGuard { latch: self });
        }
        if state.writer.is_none() && state.readers.is_empty() {
            state.writer = Some(me);
            state.write_count = 1;
            return Some(WriteGuard { latch: self });
        }
        None
    }

    pub fn read_lock(&self) -> ReadGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        crate::latch_assert!(
            state.writer != Some(me),
            "programmer error: thread {:?} acquiring read latch while holding write latch",
            me
        );
        loop {
            if state.writer.is_none() {
                *state.readers.entry(me).or_insert(0) += 1;
                break;
            }
            self.cv.wait(&mut state);
        }
        ReadGuard { latch: self }
    }

    /// Non-blocking read acquisition. Used by the B+Tree sibling-chain
    /// scan so it never blocks against the opposite-direction
    /// top-down insert/delete path.
    pub fn try_read_latch(&self) -> Option<ReadGuard<'_>> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.writer.is_some() && state.writer != Some(me) {
            return None;
        }
        if state.writer == Some(me) {
            return None;
        }
        *state.readers.entry(me).or_insert(0) += 1;
        Some(ReadGuard { latch: self })
    }

    /// Releases one write acquisition without going through a
    /// [`WriteGuard`]. Paired with `std::mem::forget`ing a guard from
    /// [`Self::write_lock`] — used by `LatchMemo`, which needs to record
    /// (frame, latch-kind) pairs in a `Vec` and release them out of RAII
    /// order, which a borrowed guard can't express.
    pub(crate) fn unlock_write(&self) {
        let mut state = self.state.lock();
        let me = thread::current().id();
        debug_assert_eq!(state.writer, Some(me));
        state.write_count -= 1;
        if state.write_count == 0 {
            state.writer = None;
            self.cv.notify_all();
        }
    }

    pub(crate) fn unlock_read(&self) {
        let mut state = self.state.lock();
        let me = thread::current().id();
        if let Some(count) = state.readers.get_mut(&me) {
            *count -= 1;
            if *count == 0 {
                state.readers.remove(&me);
            }
        }
        if state.readers.is_empty() {
            self.cv.notify_all();
        }
    }
}

pub struct WriteGuard<'a> {
    latch: &'a Latch,
}

impl<'a> Drop for WriteGuard<'a> {
    fn drop(&mut self) {
        self.latch.unlock_write();
    }
}

pub struct ReadGuard<'a> {
    latch: &'a Latch,
}

impl<'a> Drop for ReadGuard<'a> {
    fn drop(&mut self) {
        self.latch.unlock_read();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn recursive_write_lock() {
        let latch = Latch::new();
        let g1 = latch.write_lock();
        let g2 = latch.write_lock();
        drop(g2);
        drop(g1);
    }

    #[test]
    fn shared_read_locks() {
        let latch = Arc::new(Latch::new());
        let g1 = latch.read_lock();
        let g2 = latch.read_lock();
        drop(g1);
        drop(g2);
    }

    #[test]
    fn try_read_fails_under_writer() {
        let latch = Latch::new();
        let _w = latch.write_lock();
        // try_read_latch from another thread would fail; from the same
        // thread it must not silently double-acquire either.
        assert!(latch.try_write_lock().is_some());
    }
}
