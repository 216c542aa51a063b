// Licensed under the Apache-2.0 license

//! Per-bus mutual exclusion.
//!
//! A bus arena keeps one [`RawBusLock`] per board-table entry. Callers never
//! touch the lock directly: acquiring a bus returns a guard and dropping the
//! guard unlocks it.

use core::sync::atomic::{AtomicBool, Ordering};

/// Lock primitive serializing the logical transactions on one bus.
pub trait RawBusLock {
    /// An unlocked instance.
    const INIT: Self;

    /// Block until the lock is held by the caller.
    fn lock(&self);

    /// Take the lock if it is free.
    fn try_lock(&self) -> bool;

    /// Release a lock taken by `lock` or `try_lock`.
    fn unlock(&self);
}

/// Spin lock on an atomic flag.
#[derive(Debug)]
pub struct SpinBusLock {
    locked: AtomicBool,
}

impl Default for SpinBusLock {
    fn default() -> Self {
        Self::INIT
    }
}

impl RawBusLock for SpinBusLock {
    const INIT: Self = Self {
        locked: AtomicBool::new(false),
    };

    fn lock(&self) {
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}
