//! Team member to leaf binding cache.
//!
//! One slot per team member index, holding the logical index of the leaf the
//! member was last found on. Slots are only written by their own member, so
//! relaxed atomics suffice: a stale read can only cost a redundant lookup.

use std::sync::atomic::{AtomicUsize, Ordering};

const UNBOUND: usize = usize::MAX;

/// Fixed-size table of cached leaf bindings.
#[derive(Debug)]
pub struct BindingTable {
    slots: Box<[AtomicUsize]>,
}

impl BindingTable {
    /// Table with `capacity` empty slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicUsize::new(UNBOUND)).collect(),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Cached leaf of `member`, if any.
    #[inline]
    pub fn get(&self, member: usize) -> Option<usize> {
        self.slots
            .get(member)
            .map(|slot| slot.load(Ordering::Relaxed))
            .filter(|leaf| *leaf != UNBOUND)
    }

    /// Cache `leaf` for `member`. Returns false if `member` has no slot.
    #[inline]
    pub fn set(&self, member: usize, leaf: usize) -> bool {
        match self.slots.get(member) {
            Some(slot) => {
                slot.store(leaf, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Forget the binding of `member`.
    #[inline]
    pub fn clear(&self, member: usize) {
        if let Some(slot) = self.slots.get(member) {
            slot.store(UNBOUND, Ordering::Relaxed);
        }
    }
}
