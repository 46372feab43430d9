//! Full heap scan: walks every occupied slot of a
//! [`RecordFile`] in page/slot order, applying an optional predicate and
//! then the transaction's MVCC visibility check, skipping whatever either
//! one rejects.
//!
//! Grounded on `src/record/record_scanner.rs`'s page-at-a-time advance
//! over the bitmap, generalized to take both filters as plain closures
//! instead of a `Condition`/`Trx` pair baked into the type.

use crate::error::StorageResult;
use crate::page::PageId;
use crate::record::file::RecordFile;
use crate::record::page;
use crate::record::rid::Rid;
use std::sync::Arc;

type Predicate<'a> = Box<dyn Fn(&[u8]) -> bool + 'a>;

pub struct RecordFileScanner<'a> {
    file: Arc<RecordFile>,
    page_num: usize,
    slot: usize,
    condition: Option<Predicate<'a>>,
    visibility: Option<Predicate<'a>>,
}

impl<'a> RecordFileScanner<'a> {
    pub fn new(file: Arc<RecordFile>) -> Self {
        RecordFileScanner {
            file,
            page_num: 1, // page 0 is the pool's file header.
            slot: 0,
            condition: None,
            visibility: None,
        }
    }

    pub fn with_condition(mut self, f: impl Fn(&[u8]) -> bool + 'a) -> Self {
        self.condition = Some(Box::new(f));
        self
    }

    pub fn with_visibility(mut self, f: impl Fn(&[u8]) -> bool + 'a) -> Self {
        self.visibility = Some(Box::new(f));
        self
    }

    fn advance(&mut self) -> StorageResult<Option<(Rid, Vec<u8>)>> {
        loop {
            let frame = match self
                .file
                .buffer_pool()
                .get_page(PageId::new(self.file.pool_id(), self.page_num))
            {
                Ok(frame) => frame,
                Err(_) => return Ok(None), // ran off the end of the heap
            };

            let _guard = frame.latch.read_lock();
            let found = frame.with_bytes(|bytes| {
                page::next_set_slot(bytes, self.slot).map(|slot| {
                    let record = page::get_record(bytes, slot).expect("bitmap says occupied").to_vec();
                    (slot, record)
                })
            });
            drop(_guard);
            self.file.buffer_pool().unpin(&frame);

            match found {
                Some((slot, record)) => {
                    self.slot = slot + 1;
                    return Ok(Some((Rid::new(self.page_num, slot), record)));
                }
                None => {
                    self.page_num += 1;
                    self.slot = 0;
                }
            }
        }
    }

    /// Yields the next visible record, or `None` once the heap is
    /// exhausted. Not an [`Iterator`] impl because advancing can fail
    /// with an I/O error, which callers need to distinguish from EOF.
    pub fn next_record(&mut self) -> StorageResult<Option<(Rid, Vec<u8>)>> {
        loop {
            match self.advance()? {
                None => return Ok(None),
                Some((rid, record)) => {
                    if let Some(cond) = &self.condition {
                        if !cond(&record) {
                            continue;
                        }
                    }
                    if let Some(vis) = &self.visibility {
                        if !vis(&record) {
                            continue;
                        }
                    }
                    return Ok(Some((rid, record)));
                }
            }
        }
    }
}
