use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::{atomic::AtomicConsume, utils::Backoff};

use crate::{tracked::TrackedLock, LockError, LockKind, LockResult, RawSimpleLock};

/// Test-and-test-and-set spinlock. Waiters busy-poll with bounded
/// exponential backoff; they never park and never yield to the scheduler.
#[derive(Debug)]
pub struct RawSpinLock {
    flag: AtomicBool,
}

/// A spinlock that counts contended and uncontended acquisitions.
pub type TrackedSpinLock<T, R = RawSpinLock> = TrackedLock<T, R>;

impl RawSpinLock {
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    #[inline]
    fn acquire(&self) -> bool {
        if !self.flag.load_consume() {
            self.flag
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        } else {
            false
        }
    }

    #[inline]
    fn spin(&self) {
        let backoff = Backoff::new();

        while !self.acquire() {
            // `spin` caps the step; `snooze` would fall back to `yield_now`.
            backoff.spin();
        }
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawSimpleLock for RawSpinLock {
    type Attributes = ();

    const KIND: LockKind = LockKind::Spin;

    fn init(_: &()) -> LockResult<Self> {
        Ok(Self::new())
    }

    #[inline]
    fn try_lock(&self) -> LockResult<()> {
        if self.acquire() {
            Ok(())
        } else {
            Err(LockError::WouldBlock)
        }
    }

    #[inline]
    fn lock(&self) -> LockResult<()> {
        self.spin();
        Ok(())
    }

    #[inline]
    unsafe fn unlock(&self) -> LockResult<()> {
        if !self.is_locked() {
            return Err(LockError::NotLocked);
        }
        self.flag.store(false, Ordering::Release);
        Ok(())
    }
}

// Lets the spinlock guard internal state (the spinlock registry) without
// being instrumented itself.
unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = lock_api::GuardSend;

    #[inline]
    fn lock(&self) {
        self.spin();
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.acquire()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.flag.store(false, Ordering::Release);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        RawSpinLock::is_locked(self)
    }
}
