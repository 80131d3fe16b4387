//! Arena lock - spin or parking, picked at initialization
//!
//! Arena critical sections are a few pointer updates, plus a rare mapping
//! syscall when the arena grows. Spinning with backoff beats putting the
//! thread to sleep for that shape of work.

use core::sync::atomic::{AtomicBool, Ordering};
use crossbeam::utils::Backoff;
use parking_lot::lock_api::{self, GuardSend, RawMutex};

use crate::config::LockStrategy;

/// Test-and-test-and-set spin lock
pub struct RawSpinLock {
    locked: AtomicBool,
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {
        if self.try_lock() {
            return;
        }
        let backoff = Backoff::new();
        loop {
            // Spin on a plain load so waiters don't bounce the cache line
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
            if self.try_lock() {
                return;
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

pub type SpinMutex<T> = lock_api::Mutex<RawSpinLock, T>;

/// Mutual exclusion around the arena bookkeeping
pub enum ArenaLock<T> {
    Spin(SpinMutex<T>),
    Parking(parking_lot::Mutex<T>),
}

impl<T> ArenaLock<T> {
    pub fn new(strategy: LockStrategy, value: T) -> Self {
        match strategy {
            LockStrategy::Spin => Self::Spin(SpinMutex::new(value)),
            LockStrategy::Parking => Self::Parking(parking_lot::Mutex::new(value)),
        }
    }

    /// Run `f` with the lock held
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        match self {
            Self::Spin(lock) => f(&mut *lock.lock()),
            Self::Parking(lock) => f(&mut *lock.lock()),
        }
    }

    pub fn strategy(&self) -> LockStrategy {
        match self {
            Self::Spin(_) => LockStrategy::Spin,
            Self::Parking(_) => LockStrategy::Parking,
        }
    }
}
