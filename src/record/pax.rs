//! Column-group (PAX) page format: same header and bitmap as the row
//! format, followed by a column-offset index and per-column dense arrays
//!.
//!
//! `insert_record`/`get_record` semantics for PAX are left undefined in
//! the source material this was grounded on (guarded with an
//! unreachable exit there). We specify a
//! stub rather than inventing semantics: callers get
//! [`StorageError::Unimplemented`] until PAX mutation is in scope.
//! `get_chunk`, which the source does define, is implemented.

use crate::error::{StorageError, StorageResult};
use crate::record::page::{self, PageHeader};

/// `data + data_offset + col_idx[c-1] + field_len(c) * slot`.
pub struct ColumnLayout {
    pub field_lens: Vec<usize>,
}

impl ColumnLayout {
    fn col_offset(&self, header: &PageHeader, col: usize) -> usize {
        let index_len = self.field_lens.len() * 4;
        let mut offset = header.data_offset as usize + index_len;
        for &len in &self.field_lens[..col] {
            offset += len * header.capacity as usize;
        }
        offset
    }

    /// Materializes a contiguous batch of `count` rows' values for column
    /// `col`, skipping nothing — callers filter out unoccupied slots
    /// themselves using the page's bitmap.
    pub fn get_chunk<'a>(
        &self,
        bytes: &'a [u8],
        col: usize,
        start_slot: usize,
        count: usize,
    ) -> StorageResult<Vec<&'a [u8]>> {
        let header = page::header(bytes);
        let field_len = *self
            .field_lens
            .get(col)
            .ok_or_else(|| StorageError::InvalidArgument("column index out of range".into()))?;
        let base = self.col_offset(&header, col);
        let mut out = Vec::with_capacity(count);
        for slot in start_slot..start_slot + count {
            let start = base + field_len * slot;
            out.push(&bytes[start..start + field_len]);
        }
        Ok(out)
    }

    pub fn insert_record(&self, _bytes: &mut [u8], _values: &[&[u8]]) -> StorageResult<usize> {
        Err(StorageError::Unimplemented("PAX insert_record"))
    }

    pub fn get_record(&self, _bytes: &[u8], _slot: usize) -> StorageResult<Vec<u8>> {
        Err(StorageError::Unimplemented("PAX get_record"))
    }
}
