//! Double-write buffer: torn-page protection between the buffer pool and
//! the data files.
//!
//! Every page write from the buffer pool is first copied into a slot of a
//! dedicated on-disk file. Once the slot count reaches `threshold`, all
//! valid slots are flushed to their real locations and marked invalid. On
//! restart, any slot whose stored checksum matches its page content is
//! authoritative over whatever the data file holds, because a crash mid
//! flush can tear the data-file write but never the double-write slot
//! (written once, verified on load).
//!
//! Grounded on `original_source/.../buffer/double_write_buffer.cpp`: the
//! slot key there is `{buffer_pool_id, page_num}`, and — as the comment on
//! `DoubleWriteBufferHeader` notes — only individual page slots are
//! checksummed, never the file's own header. We reproduce that gap
//! rather than silently fixing it.

use std::convert::TryInto;
use crate::buffer_pool::FileTable;
use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PageId};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

struct Slot {
    id: PageId,
    data: Vec<u8>,
}

struct Inner {
    slots: Vec<Slot>,
    file: File,
}

pub struct DoubleWriteBuffer {
    page_size: usize,
    threshold: usize,
    files: Mutex<Option<std::sync::Weak<FileTable>>>,
    inner: Mutex<Inner>,
}

// On-disk slot layout: [valid: u8][pool_id: u32][page_num: u64][checksum: u32][page bytes].
const SLOT_PREFIX_LEN: usize = 1 + 4 + 8 + 4;

impl DoubleWriteBuffer {
    pub fn open(path: &Path, page_size: usize, threshold: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| StorageError::IoOpen(e.to_string()))?;
        let mut dw = DoubleWriteBuffer {
            page_size,
            threshold,
            files: Mutex::new(None),
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                file,
            }),
        };
        dw.load()?;
        Ok(dw)
    }

    /// The buffer pool registers itself so flushed slots land in the real
    /// data files. A `Weak` reference avoids an ownership cycle (the pool
    /// owns this buffer with a strong `Arc`).
    pub fn bind_files(&self, files: std::sync::Weak<FileTable>) {
        *self.files.lock() = Some(files);
    }

    fn slot_len(&self) -> usize {
        SLOT_PREFIX_LEN + self.page_size
    }

    fn load(&mut self) -> StorageResult<()> {
        let inner = self.inner.get_mut();
        let len = inner
            .file
            .metadata()
            .map_err(|e| StorageError::IoRead(e.to_string()))?
            .len() as usize;
        let slot_len = SLOT_PREFIX_LEN + self.page_size;
        let count = len / slot_len;
        inner.file.seek(SeekFrom::Start(0)).ok();
        for _ in 0..count {
            let mut buf = vec![0u8; slot_len];
            if inner.file.read_exact(&mut buf).is_err() {
                break;
            }
            let valid = buf[0] == 1;
            if !valid {
                continue;
            }
            let pool_id = u32::from_be_bytes(buf[1..5].try_into().unwrap());
            let page_num = u64::from_be_bytes(buf[5..13].try_into().unwrap()) as usize;
            let checksum = u32::from_be_bytes(buf[13..17].try_into().unwrap());
            let data = buf[SLOT_PREFIX_LEN..].to_vec();
            let id = PageId::new(pool_id, page_num);
            let page = Page::from_bytes(id, data.clone(), 0);
            if page.checksum() == checksum {
                inner.slots.push(Slot { id, data });
            }
            // A checksum mismatch here means the slot itself was
            // corrupted (e.g. partially written before the crash that
            // also tore the data-file copy). Known gap: the slot is
            // silently dropped, not repaired.
        }
        Ok(())
    }

    /// Returns the intact copy of `id` staged in the double-write file, if
    /// one exists. Called by the buffer pool before falling back to
    /// reading the data file directly.
    pub fn recover_page(&self, id: PageId) -> StorageResult<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        Ok(inner
            .slots
            .iter()
            .rev()
            .find(|s| s.id == id)
            .map(|s| s.data.clone()))
    }

    /// Stages a dirty page for writeback. May trigger a flush of all
    /// valid slots once `threshold` is reached.
    pub fn stage(&self, page: Page) -> StorageResult<()> {
        let id = page.id;
        let data = page.bytes().to_vec();
        let mut inner = self.inner.lock();
        inner.slots.retain(|s| s.id != id);
        inner.slots.push(Slot { id, data });
        self.persist_locked(&mut inner)?;
        if inner.slots.len() >= self.threshold {
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    fn persist_locked(&self, inner: &mut Inner) -> StorageResult<()> {
        inner
            .file
            .set_len(0)
            .map_err(|e| StorageError::IoWrite(e.to_string()))?;
        inner
            .file
            .seek(SeekFrom::Start(0))
            .map_err(|e| StorageError::IoSeek(e.to_string()))?;
        for slot in &inner.slots {
            let page = Page::from_bytes(slot.id, slot.data.clone(), 0);
            let checksum = page.checksum();
            let mut buf = Vec::with_capacity(self.slot_len());
            buf.push(1u8);
            buf.extend_from_slice(&slot.id.pool_id.to_be_bytes());
            buf.extend_from_slice(&(slot.id.page_num as u64).to_be_bytes());
            buf.extend_from_slice(&checksum.to_be_bytes());
            buf.extend_from_slice(&slot.data);
            inner
                .file
                .write_all(&buf)
                .map_err(|e| StorageError::IoWrite(e.to_string()))?;
        }
        inner.file.flush().map_err(|e| StorageError::IoWrite(e.to_string()))
    }

    fn flush_locked(&self, inner: &mut Inner) -> StorageResult<()> {
        let files = self
            .files
            .lock()
            .as_ref()
            .and_then(|w| w.upgrade())
            .ok_or_else(|| StorageError::Internal("double-write buffer not bound to files".into()))?;

        let mut slots = std::mem::take(&mut inner.slots);
        slots.sort_by_key(|s| s.id.page_num);
        for slot in &slots {
            files.write_home(slot.id, &slot.data)?;
        }
        self.persist_locked(inner)?;
        Ok(())
    }

    /// Drains slots belonging to `pool_id` in ascending page-number order,
    /// called when a file is closed so that pages which have not yet been
    /// extended on disk don't trigger a seek past EOF during an
    /// unconditional flush.
    pub fn clear_pages(&self, pool_id: u32) -> StorageResult<()> {
        let files = self
            .files
            .lock()
            .as_ref()
            .and_then(|w| w.upgrade())
            .ok_or_else(|| StorageError::Internal("double-write buffer not bound to files".into()))?;
        let mut inner = self.inner.lock();
        let mut mine: Vec<Slot> = Vec::new();
        let mut rest: Vec<Slot> = Vec::new();
        for slot in inner.slots.drain(..) {
            if slot.id.pool_id == pool_id {
                mine.push(slot);
            } else {
                rest.push(slot);
            }
        }
        mine.sort_by_key(|s| s.id.page_num);
        for slot in &mine {
            files.write_home(slot.id, &slot.data)?;
        }
        inner.slots = rest;
        self.persist_locked(&mut inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageId;
    use tempfile::tempdir;

    #[test]
    fn stage_and_recover_round_trip() {
        let dir = tempdir().unwrap();
        let dw = DoubleWriteBuffer::open(&dir.path().join("dw.bin"), 64, 8).unwrap();
        let id = PageId::new(1, 3);
        let mut page = Page::new(id, 64);
        page.bytes_mut()[0] = 42;
        dw.stage(page).unwrap();

        let recovered = dw.recover_page(id).unwrap().unwrap();
        assert_eq!(recovered[0], 42);
    }
}
