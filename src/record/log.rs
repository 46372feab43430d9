//! Wire format for `RECORD_MANAGER`-module WAL entries: every
//! physical mutation the heap page functions in [`crate::record::page`]
//! perform gets logged here before the mutation is allowed to be evicted.

use std::convert::TryInto;
use crate::page::{PageNum, PoolId};
use crate::record::rid::Rid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordOp {
    InitPage = 0,
    Insert = 1,
    Delete = 2,
    Update = 3,
}

impl RecordOp {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(RecordOp::InitPage),
            1 => Some(RecordOp::Insert),
            2 => Some(RecordOp::Delete),
            3 => Some(RecordOp::Update),
            _ => None,
        }
    }
}

pub struct RecordLogEntry {
    pub pool_id: PoolId,
    pub op: RecordOp,
    pub page_num: PageNum,
    pub slot_num: usize,
    pub record_size: usize,
    /// Populated for `Insert`/`Update`, the new record bytes; populated
    /// for `Delete`, the bytes being removed (so redo/undo can restore
    /// them); empty for `InitPage`.
    pub record: Vec<u8>,
}

impl RecordLogEntry {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 1 + 8 + 8 + 4 + self.record.len());
        buf.extend_from_slice(&self.pool_id.to_be_bytes());
        buf.push(self.op as u8);
        buf.extend_from_slice(&(self.page_num as u64).to_be_bytes());
        buf.extend_from_slice(&(self.slot_num as u64).to_be_bytes());
        buf.extend_from_slice(&(self.record_size as u32).to_be_bytes());
        buf.extend_from_slice(&self.record);
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 25 {
            return None;
        }
        let pool_id = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let op = RecordOp::from_u8(buf[4])?;
        let page_num = u64::from_be_bytes(buf[5..13].try_into().unwrap()) as usize;
        let slot_num = u64::from_be_bytes(buf[13..21].try_into().unwrap()) as usize;
        let record_size = u32::from_be_bytes(buf[21..25].try_into().unwrap()) as usize;
        let record = buf[25..].to_vec();
        Some(RecordLogEntry {
            pool_id,
            op,
            page_num,
            slot_num,
            record_size,
            record,
        })
    }

    pub fn rid(&self) -> Rid {
        Rid::new(self.page_num, self.slot_num)
    }
}
