use std::sync::Arc;

use crossbeam::utils::CachePadded;

use crate::LockStats;

pub(crate) type SharedStats = Arc<CachePadded<LockStats>>;

/// Handle to a registry entry.
///
/// The generation makes a handle to a vacated slot stale, so removing the
/// same entry twice, or removing after the slot was reused, is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    prev: Option<u32>,
    next: Option<u32>,
    stats: Option<SharedStats>,
}

/// Doubly-linked list threaded through an index-stable arena.
///
/// `head` and `tail` are both `None` or both `Some`; for every linked slot
/// `next.prev` and `prev.next` point back at it.
#[derive(Debug, Default)]
pub(crate) struct Chain {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl Chain {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Link `stats` in front of the current head.
    pub(crate) fn push_front(&mut self, stats: SharedStats) -> EntryId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    prev: None,
                    next: None,
                    stats: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        match self.head {
            Some(head) => self.slots[head as usize].prev = Some(index),
            None => self.tail = Some(index),
        }

        let slot = &mut self.slots[index as usize];
        slot.prev = None;
        slot.next = self.head;
        slot.stats = Some(stats);
        self.head = Some(index);
        self.len += 1;

        EntryId {
            index,
            generation: slot.generation,
        }
    }

    /// Unlink the entry `id` names, if it is still linked.
    pub(crate) fn remove(&mut self, id: EntryId) -> Option<SharedStats> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation || slot.stats.is_none() {
            return None;
        }
        let (prev, next) = (slot.prev, slot.next);

        match next {
            Some(next) => self.slots[next as usize].prev = prev,
            None => self.tail = prev,
        }
        match prev {
            Some(prev) => self.slots[prev as usize].next = next,
            None => self.head = next,
        }

        let slot = &mut self.slots[id.index as usize];
        slot.prev = None;
        slot.next = None;
        slot.generation = slot.generation.wrapping_add(1);
        let stats = slot.stats.take();
        self.free.push(id.index);
        self.len -= 1;

        stats
    }

    /// Head-to-tail walk.
    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            chain: self,
            cursor: self.head,
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.head.is_none(), self.tail.is_none());

        let mut seen = 0;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let slot = &self.slots[index as usize];
            assert!(slot.stats.is_some(), "linked slot {index} is vacant");
            assert_eq!(slot.prev, prev, "broken back-link at {index}");
            seen += 1;
            assert!(seen <= self.len, "cycle in chain");
            prev = Some(index);
            cursor = slot.next;
        }
        assert_eq!(prev, self.tail);
        assert_eq!(seen, self.len);
    }
}

pub(crate) struct Iter<'a> {
    chain: &'a Chain,
    cursor: Option<u32>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a LockStats;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = &self.chain.slots[self.cursor? as usize];
        self.cursor = slot.next;
        slot.stats.as_deref().map(|stats| &**stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LockKind;

    fn stats(name: &str) -> SharedStats {
        Arc::new(CachePadded::new(LockStats::new(LockKind::Mutex, name.into())))
    }

    fn names(chain: &Chain) -> Vec<String> {
        chain.iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn newest_entry_is_head() {
        let mut chain = Chain::new();
        for name in ["a", "b", "c"] {
            chain.push_front(stats(name));
        }
        chain.assert_consistent();
        assert_eq!(names(&chain), ["c", "b", "a"]);
    }

    #[test]
    fn remove_head_middle_and_tail() {
        let mut chain = Chain::new();
        let a = chain.push_front(stats("a"));
        let b = chain.push_front(stats("b"));
        let c = chain.push_front(stats("c"));
        let d = chain.push_front(stats("d"));

        assert!(chain.remove(b).is_some());
        chain.assert_consistent();
        assert_eq!(names(&chain), ["d", "c", "a"]);

        assert!(chain.remove(d).is_some());
        chain.assert_consistent();
        assert_eq!(names(&chain), ["c", "a"]);

        assert!(chain.remove(a).is_some());
        chain.assert_consistent();
        assert_eq!(names(&chain), ["c"]);

        assert!(chain.remove(c).is_some());
        chain.assert_consistent();
        assert!(chain.head.is_none() && chain.tail.is_none());
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn stale_handle_is_ignored() {
        let mut chain = Chain::new();
        let a = chain.push_front(stats("a"));
        assert!(chain.remove(a).is_some());
        assert!(chain.remove(a).is_none());

        // The slot is reused, but the old handle must not reach the new entry.
        let b = chain.push_front(stats("b"));
        assert_eq!(a.index, b.index);
        assert!(chain.remove(a).is_none());
        chain.assert_consistent();
        assert_eq!(names(&chain), ["b"]);
    }

    #[test]
    fn every_removal_order_empties_the_chain() {
        let orders: [[usize; 4]; 6] = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [1, 3, 0, 2],
            [2, 0, 3, 1],
            [0, 3, 1, 2],
            [3, 0, 2, 1],
        ];

        for order in orders {
            let mut chain = Chain::new();
            let ids: Vec<EntryId> = (0..4)
                .map(|i| chain.push_front(stats(&format!("l{i}"))))
                .collect();

            for (removed, &i) in order.iter().enumerate() {
                assert!(chain.remove(ids[i]).is_some());
                chain.assert_consistent();
                assert_eq!(chain.len(), 3 - removed);
            }
            assert!(chain.head.is_none() && chain.tail.is_none());
        }
    }
}
