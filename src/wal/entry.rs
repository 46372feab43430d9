//! The WAL's unit of durability: a header plus an opaque subsystem
//! payload.

use std::convert::TryInto;
use crate::page::Lsn;

/// Which subsystem owns a log entry, carried in its header so the
/// integrated replayer can dispatch without peeking at the
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModuleId {
    BufferPool = 0,
    RecordManager = 1,
    BplusTree = 2,
    Transaction = 3,
}

impl ModuleId {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ModuleId::BufferPool),
            1 => Some(ModuleId::RecordManager),
            2 => Some(ModuleId::BplusTree),
            3 => Some(ModuleId::Transaction),
            _ => None,
        }
    }
}

/// Fixed-size header: LSN, module id, payload size. Entries are never
/// partially written — a reader that hits a truncated header or a
/// payload-size field larger than the remaining file treats it as the
/// crash tail, not an error.
pub const HEADER_LEN: usize = 8 + 1 + 4;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub lsn: Lsn,
    pub module_id: ModuleId,
    pub payload: Vec<u8>,
}

impl LogEntry {
    pub fn new(module_id: ModuleId, payload: Vec<u8>) -> Self {
        LogEntry {
            lsn: 0,
            module_id,
            payload,
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.lsn.to_be_bytes());
        buf.push(self.module_id as u8);
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decodes one entry from the front of `buf`. Returns `None` if the
    /// header is incomplete, the module id is unrecognized, or the
    /// declared payload size would run past the end of `buf` — all three
    /// are treated identically, as the tail marker of a crash.
    pub fn decode(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let lsn = u64::from_be_bytes(buf[0..8].try_into().unwrap());
        let module_id = ModuleId::from_u8(buf[8])?;
        let payload_len = u32::from_be_bytes(buf[9..13].try_into().unwrap()) as usize;
        if payload_len > buf.len() - HEADER_LEN {
            return None;
        }
        let payload = buf[HEADER_LEN..HEADER_LEN + payload_len].to_vec();
        Some((
            LogEntry {
                lsn,
                module_id,
                payload,
            },
            HEADER_LEN + payload_len,
        ))
    }
}
