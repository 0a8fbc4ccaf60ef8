// ── Reactive keyed collection ──
//
// Concurrent storage with O(1) lookups and push-based change
// notification via `watch` channels. Values are replaced whole, never
// mutated in place, so a reader holding an `Arc` never sees a torn record.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

/// A reactive collection keyed by string.
///
/// Every mutation bumps a version counter and rebuilds the key-ordered
/// snapshot that subscribers receive.
pub(crate) struct EntityCollection<T: Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation, ordered by key.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace a value. Returns `true` if the key was new.
    #[cfg(test)]
    pub(crate) fn upsert(&self, key: String, value: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(value)).is_none();
        self.publish();
        is_new
    }

    /// Build the replacement from the current value while holding the
    /// entry lock, so a concurrent writer to the same key cannot interleave.
    /// Returns `true` if the key was new.
    pub(crate) fn upsert_with<F>(&self, key: String, build: F) -> bool
    where
        F: FnOnce(Option<&T>) -> T,
    {
        let is_new = {
            match self.by_key.entry(key) {
                Entry::Occupied(mut slot) => {
                    let next = build(Some(slot.get().as_ref()));
                    slot.insert(Arc::new(next));
                    false
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(build(None)));
                    true
                }
            }
        };
        self.publish();
        is_new
    }

    /// Replace an existing value. No-op (returns `false`) for unknown keys.
    pub(crate) fn update<F>(&self, key: &str, build: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let updated = {
            match self.by_key.get_mut(key) {
                Some(mut slot) => {
                    let next = build(slot.value().as_ref());
                    *slot = Arc::new(next);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.publish();
        }
        updated
    }

    /// Remove a value by key. Returns the removed value if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    /// All current keys, sorted.
    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.by_key.iter().map(|r| r.key().clone()).collect();
        keys.sort_unstable();
        keys
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Rebuild the snapshot and bump the version. Callers must not hold a
    /// map guard: iterating takes every shard lock.
    fn publish(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let values = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}
