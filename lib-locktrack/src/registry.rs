//! Process-wide lists of live tracked locks, one per [`LockKind`].

use std::io::{self, Write};

use once_cell::sync::Lazy;

use crate::{spin_lock::RawSpinLock, LockKind, LockStats};

use self::chain::Chain;

mod chain;

pub use self::chain::EntryId;
pub(crate) use self::chain::SharedStats;

static MUTEX_REGISTRY: Registry = Registry::new(LockKind::Mutex);

// Built on first use, mirroring native spinlocks that have no static
// initializer.
static SPIN_REGISTRY: Lazy<Registry> = Lazy::new(|| Registry::new(LockKind::Spin));

pub fn mutex_registry() -> &'static Registry {
    &MUTEX_REGISTRY
}

pub fn spin_registry() -> &'static Registry {
    &SPIN_REGISTRY
}

pub fn registry_for(kind: LockKind) -> &'static Registry {
    match kind {
        LockKind::Mutex => mutex_registry(),
        LockKind::Spin => spin_registry(),
    }
}

/// The chain's guard: an un-instrumented lock of the registry's own kind,
/// never one of the locks it tracks.
#[derive(Debug)]
enum Guarded {
    Mutex(parking_lot::Mutex<Chain>),
    Spin(lock_api::Mutex<RawSpinLock, Chain>),
}

/// All live tracked locks of one kind, newest first.
#[derive(Debug)]
pub struct Registry {
    kind: LockKind,
    chain: Guarded,
}

impl Registry {
    pub const fn new(kind: LockKind) -> Self {
        let chain = match kind {
            LockKind::Mutex => Guarded::Mutex(parking_lot::const_mutex(Chain::new())),
            LockKind::Spin => Guarded::Spin(lock_api::Mutex::const_new(
                RawSpinLock::new(),
                Chain::new(),
            )),
        };
        Self { kind, chain }
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    fn with_chain<U>(&self, f: impl FnOnce(&mut Chain) -> U) -> U {
        match &self.chain {
            Guarded::Mutex(chain) => f(&mut chain.lock()),
            Guarded::Spin(chain) => f(&mut chain.lock()),
        }
    }

    pub(crate) fn register(&self, stats: SharedStats) -> EntryId {
        let id = self.with_chain(|chain| chain.push_front(stats.clone()));
        tracing::debug!(kind = %self.kind, name = stats.name(), ?id, "registered lock");
        id
    }

    /// Returns `false` if `id` was not linked, which is not an error.
    pub(crate) fn unregister(&self, id: EntryId) -> bool {
        match self.with_chain(|chain| chain.remove(id)) {
            Some(stats) => {
                tracing::debug!(kind = %self.kind, name = stats.name(), ?id, "unregistered lock");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.with_chain(|chain| chain.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every entry head to tail while holding the guard.
    pub fn for_each(&self, mut f: impl FnMut(&LockStats)) {
        self.with_chain(|chain| chain.iter().for_each(&mut f));
    }

    /// Write one report row per entry, holding the guard throughout.
    pub fn write_rows<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        self.with_chain(|chain| chain.iter().try_for_each(|stats| stats.write_row(&mut *out)))
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.with_chain(|chain| chain.assert_consistent());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossbeam::utils::CachePadded;

    use super::*;

    fn track(registry: &Registry, name: &str) -> (EntryId, SharedStats) {
        let stats = Arc::new(CachePadded::new(LockStats::new(registry.kind(), name.into())));
        (registry.register(stats.clone()), stats)
    }

    #[test]
    fn global_registries_match_their_kind() {
        assert_eq!(registry_for(LockKind::Mutex).kind(), LockKind::Mutex);
        assert_eq!(registry_for(LockKind::Spin).kind(), LockKind::Spin);
        assert!(std::ptr::eq(registry_for(LockKind::Spin), spin_registry()));
    }

    #[test]
    fn rows_follow_newest_first_order() {
        let registry = Registry::new(LockKind::Spin);
        let (first, _) = track(&registry, "first");
        let (_second, second_stats) = track(&registry, "second");
        second_stats.record_contended();

        let mut out = Vec::new();
        registry.write_rows(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("S second "));
        assert!(lines[0].ends_with("  100%"));
        assert!(lines[1].starts_with("S first "));

        assert!(registry.unregister(first));
        assert!(!registry.unregister(first));
        assert_eq!(registry.len(), 1);
        registry.assert_consistent();
    }
}
