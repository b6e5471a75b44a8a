use std::time::{Duration, Instant};

use lock_api::{RawMutex as _, RawMutexTimed as _};

use crate::{
    tracked::{Acquisition, TrackedGuard, TrackedLock},
    LockError, LockKind, LockResult, RawSimpleLock, RawTimedLock,
};

/// Blocking mutex backed by `parking_lot`. Waiters park in the kernel after
/// a short adaptive spin.
pub struct RawMutex {
    inner: parking_lot::RawMutex,
}

/// A blocking mutex that counts contended and uncontended acquisitions.
pub type TrackedMutex<T, R = RawMutex> = TrackedLock<T, R>;

impl RawMutex {
    pub const fn new() -> Self {
        Self {
            inner: parking_lot::RawMutex::INIT,
        }
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawMutex")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

unsafe impl RawSimpleLock for RawMutex {
    type Attributes = ();

    const KIND: LockKind = LockKind::Mutex;

    fn init(_: &()) -> LockResult<Self> {
        Ok(Self::new())
    }

    #[inline]
    fn try_lock(&self) -> LockResult<()> {
        if self.inner.try_lock() {
            Ok(())
        } else {
            Err(LockError::WouldBlock)
        }
    }

    #[inline]
    fn lock(&self) -> LockResult<()> {
        self.inner.lock();
        Ok(())
    }

    #[inline]
    unsafe fn unlock(&self) -> LockResult<()> {
        if !self.inner.is_locked() {
            return Err(LockError::NotLocked);
        }
        self.inner.unlock();
        Ok(())
    }
}

unsafe impl RawTimedLock for RawMutex {
    #[inline]
    fn try_lock_until(&self, deadline: Instant) -> LockResult<()> {
        if self.inner.try_lock_until(deadline) {
            Ok(())
        } else {
            Err(LockError::TimedOut)
        }
    }
}

impl<T, R: RawTimedLock> TrackedLock<T, R> {
    /// Like [`TrackedLock::lock`], but gives up at `deadline`.
    ///
    /// A timeout leaves both counters untouched.
    pub fn timedlock(&self, deadline: Instant) -> LockResult<TrackedGuard<'_, T, R>> {
        match self.raw().try_lock() {
            Ok(()) => Ok(self.acquired(Acquisition::Uncontended)),
            Err(LockError::WouldBlock) => {
                self.raw().try_lock_until(deadline)?;
                Ok(self.acquired(Acquisition::Contended))
            }
            Err(e) => Err(e),
        }
    }

    pub fn timedlock_for(&self, timeout: Duration) -> LockResult<TrackedGuard<'_, T, R>> {
        self.timedlock(Instant::now() + timeout)
    }
}
