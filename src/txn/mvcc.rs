//! Hidden-column MVCC bookkeeping: every stored row carries
//! two invisible `i32` columns, `trx_begin`/`trx_end`, prepended ahead of
//! the caller's own record bytes. A negative `trx_begin` marks a row
//! inserted-but-not-yet-committed by transaction `-trx_begin`; once that
//! transaction commits at stamp `C`, `trx_begin` is rewritten to `+C`.
//! Deletes work the mirror way through `trx_end`.
//!
//! Grounded on the *effect* a transaction status map normally achieves
//! (readers only ever see committed state) but implemented as
//! PostgreSQL-style tuple versioning instead of 2PL locks.

use std::convert::TryInto;
pub const HIDDEN_COLUMNS_LEN: usize = 8;

/// `trx_end`'s value for a row nobody has deleted yet.
pub const NO_END: i32 = i32::MAX;

pub fn encode_row(trx_begin: i32, trx_end: i32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HIDDEN_COLUMNS_LEN + payload.len());
    out.extend_from_slice(&trx_begin.to_be_bytes());
    out.extend_from_slice(&trx_end.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Splits a stored row into its hidden columns and user payload.
pub fn decode_row(stored: &[u8]) -> (i32, i32, &[u8]) {
    let trx_begin = i32::from_be_bytes(stored[0..4].try_into().unwrap());
    let trx_end = i32::from_be_bytes(stored[4..8].try_into().unwrap());
    (trx_begin, trx_end, &stored[HIDDEN_COLUMNS_LEN..])
}

pub fn set_trx_begin(stored: &mut [u8], trx_begin: i32) {
    stored[0..4].copy_from_slice(&trx_begin.to_be_bytes());
}

pub fn set_trx_end(stored: &mut [u8], trx_end: i32) {
    stored[4..8].copy_from_slice(&trx_end.to_be_bytes());
}

/// A row is visible iff `0 < trx_begin <= snapshot < trx_end`.
/// `self_id` lets a transaction see its own uncommitted writes (stored
/// with `trx_begin == -self_id`) and hides its own uncommitted deletes
/// (`trx_end == -self_id`), distinguishing committed (positive) from
/// uncommitted-by-self (negative). An uncommitted write or delete
/// by a *different* transaction is simply invisible to that mutation —
/// the row reads as if the other transaction's change hadn't happened.
pub fn is_visible(trx_begin: i32, trx_end: i32, snapshot: i32, self_id: i32) -> bool {
    let begin_ok = trx_begin == -self_id || (trx_begin > 0 && trx_begin <= snapshot);
    let end_ok = if trx_end == -self_id {
        false
    } else if trx_end < 0 {
        true
    } else {
        trx_end > snapshot
    };
    begin_ok && end_ok
}
