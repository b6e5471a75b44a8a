use nix::errno::Errno;
use thiserror::Error;

pub type LockResult<T> = Result<T, LockError>;

/// Failure of a lock operation.
///
/// `WouldBlock` and `TimedOut` are ordinary outcomes of the probing
/// operations; `Native` carries the primitive's own code untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("lock is held elsewhere")]
    WouldBlock,
    #[error("timed out waiting for lock")]
    TimedOut,
    #[error("out of memory while copying lock name")]
    OutOfMemory,
    #[error("lock is not held")]
    NotLocked,
    #[error("native lock primitive failed: {0}")]
    Native(#[from] Errno),
}

impl LockError {
    /// Map a pthread-style return code. Zero is success, anything else is
    /// passed through as `Native`.
    pub fn check(rc: libc::c_int) -> LockResult<()> {
        match rc {
            0 => Ok(()),
            rc => Err(LockError::Native(Errno::from_raw(rc))),
        }
    }
}
