// ── Generic reactive keyed collection ──
//
// Concurrent storage with O(1) lookups and push-based change
// notification via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A concurrent, reactive collection keyed by string.
///
/// Every mutation bumps a version counter and rebuilds the snapshot that
/// subscribers receive. Snapshots are sorted by key so consumers see a
/// stable order.
pub(crate) struct KeyedCollection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> KeyedCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace an entry. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(entity)).is_none();
        self.changed();
        is_new
    }

    /// Apply `f` to a copy of the entry and store the result.
    /// Returns `false` if the key does not exist.
    pub(crate) fn update(&self, key: &str, f: impl FnOnce(&mut T)) -> bool {
        let updated = match self.by_key.get_mut(key) {
            Some(mut entry) => {
                let mut next = T::clone(entry.value());
                f(&mut next);
                *entry = Arc::new(next);
                true
            }
            None => false,
        };
        if updated {
            self.changed();
        }
        updated
    }

    /// Remove an entry by key. Returns it if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.changed();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// First entry matching `predicate`, in key order.
    pub(crate) fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        self.snapshot()
            .iter()
            .find(|entity| predicate(entity))
            .cloned()
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn changed(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_keys() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        assert!(col.upsert("a".into(), "x".into()));
        assert!(!col.upsert("a".into(), "y".into()));
        assert_eq!(*col.get("a").unwrap(), "y");
    }

    #[test]
    fn update_mutates_in_place() {
        let col: KeyedCollection<Vec<u8>> = KeyedCollection::new();
        col.upsert("k".into(), vec![1]);
        assert!(col.update("k", |v| v.push(2)));
        assert!(!col.update("missing", |v| v.push(3)));
        assert_eq!(*col.get("k").unwrap(), vec![1, 2]);
    }

    #[test]
    fn remove_bumps_version_only_when_present() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        col.upsert("a".into(), "x".into());
        let before = *col.version.borrow();
        assert!(col.remove("missing").is_none());
        assert_eq!(*col.version.borrow(), before);
        assert!(col.remove("a").is_some());
        assert_eq!(*col.version.borrow(), before + 1);
        assert!(!col.contains("a"));
    }

    #[test]
    fn snapshot_is_sorted_by_key() {
        let col: KeyedCollection<&'static str> = KeyedCollection::new();
        col.upsert("b".into(), "second");
        col.upsert("a".into(), "first");
        let snap = col.snapshot();
        let values: Vec<&str> = snap.iter().map(|v| **v).collect();
        assert_eq!(values, vec!["first", "second"]);
        assert_eq!(*col.find(|v| v.starts_with('s')).unwrap(), "second");
    }

    #[test]
    fn subscribers_see_changes() {
        let col: KeyedCollection<u32> = KeyedCollection::new();
        let mut rx = col.subscribe();
        col.upsert("n".into(), 7);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
