//! Native pthread primitives.
//!
//! Both types box the pthread object so its address stays fixed for its
//! whole life, as POSIX requires, no matter where the owning lock moves.
//! Every return code other than the "busy" and "timed out" outcomes of the
//! probing calls is passed through as [`LockError::Native`].

use std::{
    cell::UnsafeCell,
    mem,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use nix::errno::Errno;

use crate::{LockError, LockKind, LockResult, RawSimpleLock, RawTimedLock};

/// `pthread_mutexattr_settype` values.
///
/// Recursive mutexes are not offered: a second `lock` on the owning thread
/// would hand out a second guard to the same data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MutexType {
    #[default]
    Default,
    Normal,
    ErrorCheck,
}

impl MutexType {
    fn raw(&self) -> libc::c_int {
        match self {
            MutexType::Default => libc::PTHREAD_MUTEX_DEFAULT,
            MutexType::Normal => libc::PTHREAD_MUTEX_NORMAL,
            MutexType::ErrorCheck => libc::PTHREAD_MUTEX_ERRORCHECK,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutexAttributes {
    pub kind: MutexType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpinAttributes {
    /// `PTHREAD_PROCESS_SHARED` instead of `PTHREAD_PROCESS_PRIVATE`.
    pub process_shared: bool,
}

fn busy_or(rc: libc::c_int) -> LockResult<()> {
    match rc {
        libc::EBUSY => Err(LockError::WouldBlock),
        rc => LockError::check(rc),
    }
}

pub struct PthreadMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

unsafe impl Send for PthreadMutex {}
unsafe impl Sync for PthreadMutex {}

impl PthreadMutex {
    fn get(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

unsafe impl RawSimpleLock for PthreadMutex {
    type Attributes = MutexAttributes;

    const KIND: LockKind = LockKind::Mutex;

    fn init(attributes: &MutexAttributes) -> LockResult<Self> {
        // SAFETY: zeroed storage is a valid argument to the *_init calls,
        // and the attribute object is destroyed on every path after init.
        unsafe {
            let mut attr: libc::pthread_mutexattr_t = mem::zeroed();
            LockError::check(libc::pthread_mutexattr_init(&mut attr))?;

            let rc = libc::pthread_mutexattr_settype(&mut attr, attributes.kind.raw());
            if rc != 0 {
                libc::pthread_mutexattr_destroy(&mut attr);
                return Err(LockError::Native(Errno::from_raw(rc)));
            }

            let inner = Box::new(UnsafeCell::new(mem::zeroed()));
            let rc = libc::pthread_mutex_init(inner.get(), &attr);
            libc::pthread_mutexattr_destroy(&mut attr);
            LockError::check(rc)?;

            Ok(Self { inner })
        }
    }

    #[inline]
    fn try_lock(&self) -> LockResult<()> {
        busy_or(unsafe { libc::pthread_mutex_trylock(self.get()) })
    }

    #[inline]
    fn lock(&self) -> LockResult<()> {
        LockError::check(unsafe { libc::pthread_mutex_lock(self.get()) })
    }

    #[inline]
    unsafe fn unlock(&self) -> LockResult<()> {
        LockError::check(libc::pthread_mutex_unlock(self.get()))
    }

    fn destroy(self) -> LockResult<()> {
        let rc = unsafe { libc::pthread_mutex_destroy(self.get()) };
        LockError::check(rc)
    }
}

/// Convert a monotonic deadline into the `CLOCK_REALTIME` absolute time
/// `pthread_mutex_timedlock` expects.
fn realtime_deadline(deadline: Instant) -> libc::timespec {
    let remaining = deadline.saturating_duration_since(Instant::now());
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        + remaining;
    // Some targets carry padding fields in `timespec`.
    let mut abstime: libc::timespec = unsafe { mem::zeroed() };
    abstime.tv_sec = since_epoch.as_secs() as libc::time_t;
    abstime.tv_nsec = since_epoch.subsec_nanos() as _;
    abstime
}

unsafe impl RawTimedLock for PthreadMutex {
    fn try_lock_until(&self, deadline: Instant) -> LockResult<()> {
        let abstime = realtime_deadline(deadline);
        match unsafe { libc::pthread_mutex_timedlock(self.get(), &abstime) } {
            libc::ETIMEDOUT => Err(LockError::TimedOut),
            rc => LockError::check(rc),
        }
    }
}

impl std::fmt::Debug for PthreadMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PthreadMutex").finish_non_exhaustive()
    }
}

pub struct PthreadSpinLock {
    inner: Box<UnsafeCell<libc::pthread_spinlock_t>>,
}

unsafe impl Send for PthreadSpinLock {}
unsafe impl Sync for PthreadSpinLock {}

impl PthreadSpinLock {
    fn get(&self) -> *mut libc::pthread_spinlock_t {
        self.inner.get()
    }
}

unsafe impl RawSimpleLock for PthreadSpinLock {
    type Attributes = SpinAttributes;

    const KIND: LockKind = LockKind::Spin;

    fn init(attributes: &SpinAttributes) -> LockResult<Self> {
        let pshared = if attributes.process_shared {
            libc::PTHREAD_PROCESS_SHARED
        } else {
            libc::PTHREAD_PROCESS_PRIVATE
        };
        let inner = Box::new(UnsafeCell::new(0 as libc::pthread_spinlock_t));
        LockError::check(unsafe { libc::pthread_spin_init(inner.get(), pshared) })?;
        Ok(Self { inner })
    }

    #[inline]
    fn try_lock(&self) -> LockResult<()> {
        busy_or(unsafe { libc::pthread_spin_trylock(self.get()) })
    }

    #[inline]
    fn lock(&self) -> LockResult<()> {
        LockError::check(unsafe { libc::pthread_spin_lock(self.get()) })
    }

    #[inline]
    unsafe fn unlock(&self) -> LockResult<()> {
        LockError::check(libc::pthread_spin_unlock(self.get()))
    }

    fn destroy(self) -> LockResult<()> {
        LockError::check(unsafe { libc::pthread_spin_destroy(self.get()) })
    }
}

impl std::fmt::Debug for PthreadSpinLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PthreadSpinLock").finish_non_exhaustive()
    }
}
