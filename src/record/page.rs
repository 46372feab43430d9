//! Slotted-page heap layout: a fixed `PageHeader`, an occupancy bitmap,
//! then a dense array of fixed-size record payloads.
//!
//! These are free functions over a page's raw bytes, not a owning type,
//! because the bytes live inside a buffer-pool [`crate::buffer_pool::Frame`]
//! and the caller already holds the frame's latch for the duration of the
//! call — grounded on `src/btree/page/leaf_page.rs`'s bitmap-driven slot
//! accounting, generalized from B+Tree leaves to arbitrary fixed-size heap
//! records.

use std::convert::TryInto;
use bit_vec::BitVec;

use crate::error::{StorageError, StorageResult};

pub const HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub record_count: u32,
    pub record_size: u32,
    pub capacity: u32,
    pub data_offset: u32,
}

impl PageHeader {
    fn read(bytes: &[u8]) -> Self {
        PageHeader {
            record_count: u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            record_size: u32::from_be_bytes(bytes[4..8].try_into().unwrap()),
            capacity: u32::from_be_bytes(bytes[8..12].try_into().unwrap()),
            data_offset: u32::from_be_bytes(bytes[12..16].try_into().unwrap()),
        }
    }

    fn write(&self, bytes: &mut [u8]) {
        bytes[0..4].copy_from_slice(&self.record_count.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.record_size.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.capacity.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.data_offset.to_be_bytes());
    }

    pub fn bitmap_len(&self) -> usize {
        (self.capacity as usize + 7) / 8
    }
}

/// Maximum number of fixed-size records of `record_size` bytes that fit
/// on a page of `page_size` bytes:
/// `(page_size - header - 1) * 8 >= capacity * (record_size * 8 + 1)`.
pub fn capacity_for(page_size: usize, record_size: usize) -> usize {
    let available_bits = (page_size - HEADER_LEN).saturating_sub(1) * 8;
    let bits_per_record = record_size * 8 + 1;
    available_bits / bits_per_record
}

/// Reads the occupancy bitmap out of a page's header region, the way
/// `src/btree/page/leaf_page.rs` builds its `header: BitVec<u32>` field
/// from the leading bytes of a page on load.
fn read_bitmap(bytes: &[u8]) -> BitVec<u32> {
    let h = header(bytes);
    let len = h.bitmap_len();
    BitVec::from_bytes(&bytes[HEADER_LEN..HEADER_LEN + len])
}

fn write_bitmap(bytes: &mut [u8], bitmap: &BitVec<u32>) {
    let encoded = bitmap.to_bytes();
    bytes[HEADER_LEN..HEADER_LEN + encoded.len()].copy_from_slice(&encoded);
}

fn set_bit(bytes: &mut [u8], slot: usize, used: bool) {
    let mut bitmap = read_bitmap(bytes);
    bitmap.set(slot, used);
    write_bitmap(bytes, &bitmap);
}

fn data_start(header: &PageHeader) -> usize {
    header.data_offset as usize
}

/// Writes a zeroed header and bitmap for a fresh page holding records of
/// `record_size` bytes. Does not emit the `INIT_PAGE` log entry itself —
/// that's the caller's job so it can hold the frame's write latch across
/// both the mutation and the log append, honoring the write-ahead rule.
pub fn init_empty_page(bytes: &mut [u8], record_size: usize) {
    let capacity = capacity_for(bytes.len(), record_size);
    let bitmap_len = (capacity + 7) / 8;
    let header = PageHeader {
        record_count: 0,
        record_size: record_size as u32,
        capacity: capacity as u32,
        data_offset: (HEADER_LEN + bitmap_len) as u32,
    };
    header.write(bytes);
    for b in &mut bytes[HEADER_LEN..HEADER_LEN + bitmap_len] {
        *b = 0;
    }
}

pub fn header(bytes: &[u8]) -> PageHeader {
    PageHeader::read(bytes)
}

pub fn is_slot_used(bytes: &[u8], slot: usize) -> bool {
    read_bitmap(bytes).get(slot).unwrap_or(false)
}

pub fn empty_slots_count(bytes: &[u8]) -> usize {
    let h = header(bytes);
    h.capacity as usize - h.record_count as usize
}

/// Finds the next set bit at or after `from`, for the heap scanner to
/// walk a page's occupied slots in order.
pub fn next_set_slot(bytes: &[u8], from: usize) -> Option<usize> {
    let h = header(bytes);
    let bitmap = read_bitmap(bytes);
    (from..h.capacity as usize).find(|&i| bitmap.get(i).unwrap_or(false))
}

pub fn insert_record(bytes: &mut [u8], data: &[u8]) -> StorageResult<usize> {
    let mut h = header(bytes);
    if data.len() != h.record_size as usize {
        return Err(StorageError::InvalidArgument(format!(
            "record size mismatch: expected {}, got {}",
            h.record_size,
            data.len()
        )));
    }
    let slot = (0..h.capacity as usize)
        .find(|&i| !is_slot_used(bytes, i))
        .ok_or(StorageError::BufferPoolFull)?;

    let start = data_start(&h) + slot * h.record_size as usize;
    bytes[start..start + data.len()].copy_from_slice(data);
    set_bit(bytes, slot, true);
    h.record_count += 1;
    h.write(bytes);
    Ok(slot)
}

pub fn delete_record(bytes: &mut [u8], slot: usize) -> StorageResult<()> {
    let mut h = header(bytes);
    if slot >= h.capacity as usize || !is_slot_used(bytes, slot) {
        return Err(StorageError::RecordNotExist);
    }
    set_bit(bytes, slot, false);
    h.record_count -= 1;
    h.write(bytes);
    Ok(())
}

pub fn update_record(bytes: &mut [u8], slot: usize, data: &[u8]) -> StorageResult<()> {
    let h = header(bytes);
    if slot >= h.capacity as usize || !is_slot_used(bytes, slot) {
        return Err(StorageError::RecordNotExist);
    }
    if data.len() != h.record_size as usize {
        return Err(StorageError::InvalidArgument("record size mismatch".into()));
    }
    let start = data_start(&h) + slot * h.record_size as usize;
    bytes[start..start + data.len()].copy_from_slice(data);
    Ok(())
}

/// Writes `data` into `slot` unconditionally and marks it occupied,
/// bumping `record_count` only if the slot wasn't already set. Used by
/// redo, which must reproduce the exact slot an original insert chose
/// rather than searching for a free one.
pub fn redo_insert_at(bytes: &mut [u8], slot: usize, data: &[u8]) {
    let mut h = header(bytes);
    let was_used = is_slot_used(bytes, slot);
    let start = data_start(&h) + slot * h.record_size as usize;
    bytes[start..start + data.len()].copy_from_slice(data);
    set_bit(bytes, slot, true);
    if !was_used {
        h.record_count += 1;
        h.write(bytes);
    }
}

pub fn get_record(bytes: &[u8], slot: usize) -> StorageResult<&[u8]> {
    let h = header(bytes);
    if slot >= h.capacity as usize || !is_slot_used(bytes, slot) {
        return Err(StorageError::RecordNotExist);
    }
    let start = data_start(&h) + slot * h.record_size as usize;
    Ok(&bytes[start..start + h.record_size as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_delete_bitmap_invariant() {
        let mut bytes = vec![0u8; 4096];
        init_empty_page(&mut bytes, 20);
        let h = header(&bytes);
        assert!(h.capacity > 0);

        let mut rids = Vec::new();
        for i in 0..10 {
            let mut data = vec![0u8; 20];
            data[0] = i as u8;
            let slot = insert_record(&mut bytes, &data).unwrap();
            assert!(is_slot_used(&bytes, slot));
            rids.push(slot);
        }
        assert_eq!(header(&bytes).record_count, 10);

        delete_record(&mut bytes, rids[3]).unwrap();
        assert_eq!(header(&bytes).record_count, 9);
        assert!(!is_slot_used(&bytes, rids[3]));

        let popcount = (0..header(&bytes).capacity as usize)
            .filter(|&i| is_slot_used(&bytes, i))
            .count();
        assert_eq!(popcount, header(&bytes).record_count as usize);
    }
}
