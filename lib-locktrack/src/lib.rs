//! Contention tracking for blocking mutexes and spinlocks.
//!
//! Every [`TrackedLock`] classifies each `lock` as uncontended (the first
//! non-blocking probe succeeded) or contended (the probe reported
//! `WouldBlock` and the thread had to wait), and links itself into a
//! process-wide [`Registry`] for its kind so [`stats::print`] can list every
//! live lock at any time.
//!
//! The classification is a sampling heuristic, not a measurement: a wait that
//! resolves within a few cycles still counts as contended, and a racy
//! interleaving can occasionally land on either side. In exchange the
//! uncontended path costs one extra relaxed increment.

use std::{fmt, time::Instant};

use serde::Serialize;

pub mod error;
pub mod mutex;
#[cfg(target_os = "linux")]
pub mod pthread;
pub mod registry;
pub mod spin_lock;
pub mod stats;
pub mod tracked;


pub use error::{LockError, LockResult};
pub use mutex::{RawMutex, TrackedMutex};
pub use registry::{mutex_registry, registry_for, spin_registry, EntryId, Registry};
pub use spin_lock::{RawSpinLock, TrackedSpinLock};
pub use stats::{print, snapshot, write_report, Counts, LockReport, LockStats};
pub use tracked::{Acquisition, TrackedGuard, TrackedLock};

/// The family a primitive belongs to. Each kind has its own registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LockKind {
    Mutex,
    Spin,
}

impl LockKind {
    /// Single-letter tag used in the stats report.
    pub fn tag(&self) -> char {
        match self {
            LockKind::Mutex => 'M',
            LockKind::Spin => 'S',
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKind::Mutex => write!(f, "Mutex"),
            LockKind::Spin => write!(f, "SpinLock"),
        }
    }
}

/// A native mutual-exclusion primitive.
///
/// # Safety
///
/// Implementations must provide mutual exclusion: between a successful
/// `lock`/`try_lock` and the matching `unlock`, no other caller may succeed
/// in acquiring the same primitive.
pub unsafe trait RawSimpleLock: Sized {
    type Attributes: Default;

    const KIND: LockKind;

    fn init(attributes: &Self::Attributes) -> LockResult<Self>;

    /// Non-blocking: acquire if free, otherwise `Err(LockError::WouldBlock)`.
    fn try_lock(&self) -> LockResult<()>;

    /// Blocking: acquire, waiting as long as it takes.
    fn lock(&self) -> LockResult<()>;

    /// Release the lock.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock.
    unsafe fn unlock(&self) -> LockResult<()>;

    fn destroy(self) -> LockResult<()> {
        Ok(())
    }
}

/// A primitive whose blocking acquisition can be bounded by a deadline.
///
/// # Safety
///
/// Same contract as [`RawSimpleLock`].
pub unsafe trait RawTimedLock: RawSimpleLock {
    /// Acquire before `deadline`, otherwise `Err(LockError::TimedOut)`.
    fn try_lock_until(&self, deadline: Instant) -> LockResult<()>;
}
