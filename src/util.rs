//! Small ergonomic helpers shared across subsystems.
//!
//! `HandyRwLock` mirrors the same shortcut used throughout this codebase's
//! earlier layers (and borrowed, as they note, from tikv): `.wl()` / `.rl()`
//! instead of `.write().unwrap()` / `.read().unwrap()`. We keep it on top of
//! `parking_lot::RwLock` instead of `std::sync::RwLock` because the buffer
//! pool's frame latch needs recursive write acquisition and poison-free
//! guards; `parking_lot` gives us both without extra bookkeeping.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub trait HandyRwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
    fn rl(&self) -> RwLockReadGuard<'_, T>;
}

impl<T> HandyRwLock<T> for RwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write()
    }

    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read()
    }
}

pub fn init_log() {
    use std::io::Write;

    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_micros()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .is_test(cfg!(test))
        .try_init();
}
