//! The idle store (spec §3, §4.2 — component C2).
//!
//! All implementations here are plain data structures manipulated while
//! the pool's single primary lock is held (spec §5); they do not manage
//! their own synchronization. Pluggable at construction via the
//! [`IdleStore`] trait — see [`DequeIdleStore`] (the default) and
//! [`WeakIdleStore`] (spec §9's soft/weak-reference variant).

use std::collections::VecDeque;

use crate::config::Ordering;
use crate::record::PooledObject;

/// An ordered multiset of idle records (spec §4.2).
///
/// Implementations are not required to be internally thread-safe: the
/// pool always calls through while already holding its primary lock.
pub trait IdleStore<T>: Send {
    /// Insert a newly idle record.
    fn push(&mut self, record: PooledObject<T>);

    /// Remove and return the next candidate per `ordering` (LIFO pops the
    /// most recently returned record, FIFO pops the least recently
    /// returned one). `None` if the store is empty.
    fn poll(&mut self, ordering: Ordering) -> Option<PooledObject<T>>;

    /// Remove and return up to `n` of the oldest-idle records, for the
    /// evictor's sweep (spec §4.4). Always in oldest-first order
    /// regardless of `ordering`.
    fn pop_oldest(&mut self, n: usize) -> Vec<PooledObject<T>>;

    /// Remove and return every record for which `predicate` returns
    /// `true`, scanning oldest-first. Used by the keyed multiplexer's
    /// cross-key LRU eviction (spec §4.6).
    fn remove_where(&mut self, predicate: &mut dyn FnMut(&PooledObject<T>) -> bool) -> Vec<PooledObject<T>>;

    /// Current number of idle records.
    fn len(&self) -> usize;

    /// Whether the store holds no idle records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every record (used by `clear`/`close`/`evict_everything`).
    fn drain_all(&mut self) -> Vec<PooledObject<T>>;
}

/// Default idle store: a plain double-ended queue, oldest at the front.
#[derive(Default)]
pub struct DequeIdleStore<T> {
    entries: VecDeque<PooledObject<T>>,
}

impl<T> DequeIdleStore<T> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T: Send> IdleStore<T> for DequeIdleStore<T> {
    fn push(&mut self, record: PooledObject<T>) {
        // Always append at the back; `poll` picks front (FIFO/oldest) or
        // back (LIFO/newest) so insertion order always reflects recency.
        self.entries.push_back(record);
    }

    fn poll(&mut self, ordering: Ordering) -> Option<PooledObject<T>> {
        match ordering {
            Ordering::Fifo => self.entries.pop_front(),
            Ordering::Lifo => self.entries.pop_back(),
        }
    }

    fn pop_oldest(&mut self, n: usize) -> Vec<PooledObject<T>> {
        let n = n.min(self.entries.len());
        self.entries.drain(..n).collect()
    }

    fn remove_where(
        &mut self,
        predicate: &mut dyn FnMut(&PooledObject<T>) -> bool,
    ) -> Vec<PooledObject<T>> {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_front() {
            if predicate(&entry) {
                removed.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn drain_all(&mut self) -> Vec<PooledObject<T>> {
        self.entries.drain(..).collect()
    }
}

/// A pressure oracle consulted lazily when the weak store is dereferenced.
///
/// Rust has no tracing GC, so there is no literal analogue of "the
/// collector reclaimed this idle object". This closure stands in for
/// that signal — e.g. wired to a cgroup PSI watcher or an RSS threshold
/// — and is queried once per `poll`/`pop_oldest` call, mirroring the
/// teacher's closure-based [`crate::eviction`] scaler design.
pub type MemoryPressureOracle = Box<dyn Fn() -> bool + Send + Sync>;

/// Alternative idle store (spec §9): under memory pressure, idle records
/// are discarded instead of handed out, the way a soft-reference pool
/// lets the collector reclaim idle entries. The underlying ordering is
/// otherwise identical to [`DequeIdleStore`]; entries flagged as
/// reclaimed by the oracle are dropped lazily the next time they would
/// have been dereferenced, rather than destroyed out of band.
pub struct WeakIdleStore<T> {
    inner: DequeIdleStore<T>,
    oracle: MemoryPressureOracle,
    reclaimed: usize,
}

impl<T> WeakIdleStore<T> {
    /// Create a weak idle store consulting `oracle` on every
    /// dereference. When `oracle()` returns `true`, the next poll/pop
    /// result is discarded (as if its weak handle had gone dead) and the
    /// search continues.
    pub fn new(oracle: MemoryPressureOracle) -> Self {
        Self {
            inner: DequeIdleStore::new(),
            oracle,
            reclaimed: 0,
        }
    }

    /// How many idle records have been lazily reclaimed so far.
    #[must_use]
    pub fn reclaimed_count(&self) -> usize {
        self.reclaimed
    }
}

impl<T: Send> IdleStore<T> for WeakIdleStore<T> {
    fn push(&mut self, record: PooledObject<T>) {
        self.inner.push(record);
    }

    fn poll(&mut self, ordering: Ordering) -> Option<PooledObject<T>> {
        loop {
            let candidate = self.inner.poll(ordering)?;
            if (self.oracle)() {
                self.reclaimed += 1;
                continue;
            }
            return Some(candidate);
        }
    }

    fn pop_oldest(&mut self, n: usize) -> Vec<PooledObject<T>> {
        let candidates = self.inner.pop_oldest(n);
        candidates
            .into_iter()
            .filter(|_| {
                if (self.oracle)() {
                    self.reclaimed += 1;
                    false
                } else {
                    true
                }
            })
            .collect()
    }

    fn remove_where(
        &mut self,
        predicate: &mut dyn FnMut(&PooledObject<T>) -> bool,
    ) -> Vec<PooledObject<T>> {
        self.inner.remove_where(predicate)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn drain_all(&mut self) -> Vec<PooledObject<T>> {
        self.inner.drain_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::sync::Arc;

    #[test]
    fn lifo_poll_returns_most_recently_pushed() {
        let mut store = DequeIdleStore::new();
        store.push(PooledObject::new(1));
        store.push(PooledObject::new(2));
        store.push(PooledObject::new(3));

        assert_eq!(store.poll(Ordering::Lifo).unwrap().instance, 3);
        assert_eq!(store.poll(Ordering::Lifo).unwrap().instance, 2);
        assert_eq!(store.poll(Ordering::Lifo).unwrap().instance, 1);
        assert!(store.poll(Ordering::Lifo).is_none());
    }

    #[test]
    fn fifo_poll_returns_least_recently_pushed() {
        let mut store = DequeIdleStore::new();
        store.push(PooledObject::new(1));
        store.push(PooledObject::new(2));
        store.push(PooledObject::new(3));

        assert_eq!(store.poll(Ordering::Fifo).unwrap().instance, 1);
        assert_eq!(store.poll(Ordering::Fifo).unwrap().instance, 2);
        assert_eq!(store.poll(Ordering::Fifo).unwrap().instance, 3);
    }

    #[test]
    fn pop_oldest_respects_insertion_order_and_cap() {
        let mut store = DequeIdleStore::new();
        for i in 0..5 {
            store.push(PooledObject::new(i));
        }
        let oldest_two: Vec<_> = store.pop_oldest(2).into_iter().map(|r| r.instance).collect();
        assert_eq!(oldest_two, vec![0, 1]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn pop_oldest_caps_at_available_len() {
        let mut store = DequeIdleStore::new();
        store.push(PooledObject::new(1));
        let popped = store.pop_oldest(10);
        assert_eq!(popped.len(), 1);
    }

    #[test]
    fn remove_where_extracts_matching_and_keeps_rest_in_order() {
        let mut store = DequeIdleStore::new();
        for i in 0..5 {
            store.push(PooledObject::new(i));
        }
        let removed: Vec<_> = store
            .remove_where(&mut |r| r.instance % 2 == 0)
            .into_iter()
            .map(|r| r.instance)
            .collect();
        assert_eq!(removed, vec![0, 2, 4]);
        assert_eq!(store.len(), 2);

        let remaining: Vec<_> = store
            .drain_all()
            .into_iter()
            .map(|r| r.instance)
            .collect();
        assert_eq!(remaining, vec![1, 3]);
    }

    #[test]
    fn drain_all_empties_the_store() {
        let mut store = DequeIdleStore::new();
        store.push(PooledObject::new(1));
        store.push(PooledObject::new(2));
        assert_eq!(store.drain_all().len(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn weak_store_behaves_like_deque_when_not_under_pressure() {
        let mut store = WeakIdleStore::new(Box::new(|| false));
        store.push(PooledObject::new(1));
        store.push(PooledObject::new(2));
        assert_eq!(store.poll(Ordering::Lifo).unwrap().instance, 2);
        assert_eq!(store.reclaimed_count(), 0);
    }

    #[test]
    fn weak_store_discards_entries_under_sustained_pressure() {
        let under_pressure = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&under_pressure);
        let mut store = WeakIdleStore::new(Box::new(move || flag.load(AtomicOrdering::SeqCst)));
        store.push(PooledObject::new(1));
        store.push(PooledObject::new(2));

        assert!(store.poll(Ordering::Fifo).is_none());
        assert_eq!(store.reclaimed_count(), 2);
    }

    #[test]
    fn weak_store_pop_oldest_filters_reclaimed() {
        let toggled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&toggled);
        let mut store = WeakIdleStore::new(Box::new(move || flag.load(AtomicOrdering::SeqCst)));
        store.push(PooledObject::new(1));
        store.push(PooledObject::new(2));
        toggled.store(true, AtomicOrdering::SeqCst);
        let survivors = store.pop_oldest(2);
        assert!(survivors.is_empty());
        assert_eq!(store.reclaimed_count(), 2);
    }
}
