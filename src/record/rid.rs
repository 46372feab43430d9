//! `RID = (page_num, slot_num)`.

use std::convert::TryInto;
use crate::page::PageNum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub page_num: PageNum,
    pub slot_num: usize,
}

impl Rid {
    pub fn new(page_num: PageNum, slot_num: usize) -> Self {
        Rid { page_num, slot_num }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&(self.page_num as u64).to_be_bytes());
        buf.extend_from_slice(&(self.slot_num as u64).to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Self {
        let page_num = u64::from_be_bytes(buf[0..8].try_into().unwrap()) as usize;
        let slot_num = u64::from_be_bytes(buf[8..16].try_into().unwrap()) as usize;
        Rid { page_num, slot_num }
    }

    pub const ENCODED_LEN: usize = 16;
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_num, self.slot_num)
    }
}
