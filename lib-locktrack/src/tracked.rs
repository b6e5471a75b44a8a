use std::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    ptr,
    sync::Arc,
};

use crossbeam::utils::CachePadded;

use crate::{
    registry::{registry_for, EntryId, Registry, SharedStats},
    Counts, LockError, LockKind, LockResult, LockStats, RawSimpleLock,
};

/// How a guard came to hold its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The first non-blocking probe succeeded.
    Uncontended,
    /// The probe found the lock held and the caller had to wait.
    Contended,
    /// Acquired through `trylock`, which is not counted.
    Untracked,
}

/// A lock around `T` that counts how often acquiring it had to wait, and is
/// listed in the registry for its kind from construction until it is
/// destroyed or dropped.
pub struct TrackedLock<T: ?Sized, R: RawSimpleLock> {
    raw: ManuallyDrop<R>,
    stats: SharedStats,
    registry: &'static Registry,
    entry: EntryId,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send, R: RawSimpleLock + Send> Send for TrackedLock<T, R> {}
unsafe impl<T: ?Sized + Send, R: RawSimpleLock + Sync> Sync for TrackedLock<T, R> {}

#[cfg(test)]
thread_local! {
    static FAIL_NEXT_NAME_COPY: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Make the next name copy on this thread fail as if out of memory.
#[cfg(test)]
pub(crate) fn fail_next_name_copy() {
    FAIL_NEXT_NAME_COPY.with(|fail| fail.set(true));
}

fn copy_name(name: &str) -> LockResult<Box<str>> {
    #[cfg(test)]
    if FAIL_NEXT_NAME_COPY.with(|fail| fail.replace(false)) {
        return Err(LockError::OutOfMemory);
    }

    let mut owned = String::new();
    owned
        .try_reserve_exact(name.len())
        .map_err(|_| LockError::OutOfMemory)?;
    owned.push_str(name);
    Ok(owned.into_boxed_str())
}

impl<T, R: RawSimpleLock> TrackedLock<T, R> {
    /// Create a lock with default attributes, listed in the global registry
    /// for `R`'s kind.
    pub fn new(data: T, name: &str) -> LockResult<Self> {
        Self::with_attributes(data, &R::Attributes::default(), name)
    }

    pub fn with_attributes(data: T, attributes: &R::Attributes, name: &str) -> LockResult<Self> {
        Self::new_in(data, attributes, name, registry_for(R::KIND))
    }

    /// Create a lock listed in `registry` instead of the global one.
    ///
    /// Nothing is registered unless every step succeeds: a failing native
    /// init is returned as is, and a failed name copy tears the primitive
    /// down again before reporting `OutOfMemory`.
    pub fn new_in(
        data: T,
        attributes: &R::Attributes,
        name: &str,
        registry: &'static Registry,
    ) -> LockResult<Self> {
        let raw = R::init(attributes)?;

        let name = match copy_name(name) {
            Ok(name) => name,
            Err(e) => {
                if let Err(destroy) = raw.destroy() {
                    tracing::warn!(error = %destroy, "failed to destroy primitive after init error");
                }
                return Err(e);
            }
        };

        let stats = Arc::new(CachePadded::new(LockStats::new(R::KIND, name)));
        let entry = registry.register(stats.clone());

        Ok(Self {
            raw: ManuallyDrop::new(raw),
            stats,
            registry,
            entry,
            data: UnsafeCell::new(data),
        })
    }

    /// Unlist the lock and destroy the primitive, returning its result.
    pub fn destroy(self) -> LockResult<()> {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never used again and its `Drop` does not run, so
        // the primitive is torn down once and the other fields dropped once.
        unsafe {
            let result = this.teardown();
            ptr::drop_in_place(&mut this.stats);
            ptr::drop_in_place(this.data.get());
            result
        }
    }
}

impl<T: ?Sized, R: RawSimpleLock> TrackedLock<T, R> {
    pub fn name(&self) -> &str {
        self.stats.name()
    }

    pub fn kind(&self) -> LockKind {
        R::KIND
    }

    pub fn counts(&self) -> Counts {
        self.stats.counts()
    }

    pub fn registry(&self) -> &'static Registry {
        self.registry
    }

    pub(crate) fn raw(&self) -> &R {
        &self.raw
    }

    /// Probe once; on `WouldBlock` fall back to the blocking path.
    ///
    /// Success of the probe counts as uncontended, success after blocking as
    /// contended. Any other failure is returned without touching either
    /// counter.
    #[inline]
    pub fn lock(&self) -> LockResult<TrackedGuard<'_, T, R>> {
        match self.raw.try_lock() {
            Ok(()) => Ok(self.acquired(Acquisition::Uncontended)),
            Err(LockError::WouldBlock) => {
                self.raw.lock()?;
                Ok(self.acquired(Acquisition::Contended))
            }
            Err(e) => Err(e),
        }
    }

    /// A single non-blocking attempt that leaves the counters alone.
    #[inline]
    pub fn trylock(&self) -> LockResult<TrackedGuard<'_, T, R>> {
        self.raw.try_lock()?;
        Ok(self.acquired(Acquisition::Untracked))
    }

    #[inline]
    pub(crate) fn acquired(&self, acquisition: Acquisition) -> TrackedGuard<'_, T, R> {
        match acquisition {
            Acquisition::Uncontended => self.stats.record_uncontended(),
            Acquisition::Contended => self.stats.record_contended(),
            Acquisition::Untracked => {}
        }
        TrackedGuard {
            lock: self,
            acquisition,
            _not_send: PhantomData,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    unsafe fn teardown(&mut self) -> LockResult<()> {
        self.registry.unregister(self.entry);
        let raw = ManuallyDrop::take(&mut self.raw);
        raw.destroy()
    }
}

impl<T: ?Sized, R: RawSimpleLock> Drop for TrackedLock<T, R> {
    fn drop(&mut self) {
        // SAFETY: `raw` is only taken here or in `destroy`, which skips Drop.
        if let Err(e) = unsafe { self.teardown() } {
            tracing::warn!(name = self.name(), error = %e, "failed to destroy lock primitive");
        }
    }
}

impl<T: ?Sized, R: RawSimpleLock> fmt::Debug for TrackedLock<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedLock")
            .field("kind", &R::KIND)
            .field("name", &self.name())
            .field("counts", &self.counts())
            .finish_non_exhaustive()
    }
}

/// Holds a [`TrackedLock`] until dropped or explicitly unlocked.
#[must_use = "if unused the lock will immediately unlock"]
pub struct TrackedGuard<'a, T: ?Sized, R: RawSimpleLock> {
    lock: &'a TrackedLock<T, R>,
    acquisition: Acquisition,
    // Native mutexes must be released by the thread that acquired them.
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync, R: RawSimpleLock + Sync> Sync for TrackedGuard<'_, T, R> {}

impl<'a, T: ?Sized, R: RawSimpleLock> TrackedGuard<'a, T, R> {
    pub fn acquisition(&self) -> Acquisition {
        self.acquisition
    }

    /// Release the lock, returning the primitive's result.
    pub fn unlock(self) -> LockResult<()> {
        let lock = self.lock;
        std::mem::forget(self);
        // SAFETY: the guard proves the lock is held by this thread.
        unsafe { lock.raw.unlock() }
    }
}

impl<T: ?Sized, R: RawSimpleLock> Deref for TrackedGuard<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized, R: RawSimpleLock> DerefMut for TrackedGuard<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized, R: RawSimpleLock> Drop for TrackedGuard<'_, T, R> {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.lock.raw.unlock() } {
            tracing::warn!(name = self.lock.name(), error = %e, "failed to unlock");
        }
    }
}

impl<T: ?Sized + fmt::Debug, R: RawSimpleLock> fmt::Debug for TrackedGuard<'_, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedGuard")
            .field("acquisition", &self.acquisition)
            .field("data", &&**self)
            .finish()
    }
}
