use parking_lot::Mutex;
use serde::Serialize;

/// Result of a paged read (spec §4.2).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub limit: usize,
    /// Number of entries that matched the filter (or the live store count
    /// when no filter was supplied) at read time.
    pub total: usize,
}

struct Inner<T> {
    slots: Vec<Option<T>>,
    capacity: usize,
    /// Total entries ever appended; `id` of the next append is `cursor + 1`.
    cursor: u64,
}

impl<T> Inner<T> {
    fn count(&self) -> usize {
        (self.cursor.min(self.capacity as u64)) as usize
    }

    fn first_id(&self) -> u64 {
        let count = self.count() as u64;
        if count == 0 {
            0
        } else {
            self.cursor - count + 1
        }
    }
}

/// A bounded, single-producer-friendly ring buffer of entries with a
/// strictly increasing `id` assigned at append time (spec §4.2).
///
/// Eviction is silent: once `count == capacity`, each append overwrites the
/// oldest slot. Readers must tolerate `id` gaps in what they observe.
pub struct Store<T: Clone> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> Store<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "store capacity must be > 0");
        Self {
            inner: Mutex::new(Inner {
                slots: vec![None; capacity],
                capacity,
                cursor: 0,
            }),
        }
    }

    /// Assign `entry` the next `id` and place it in the ring, evicting the
    /// oldest occupant if at capacity. Returns the assigned id.
    pub fn append(&self, make_entry: impl FnMut(u64) -> T) -> u64 {
        self.append_and_get(make_entry).0
    }

    /// As [`Store::append`], but also returns a clone of the inserted entry
    /// so the caller (e.g. a producer that needs to publish what it just
    /// stored) doesn't have to re-read the store under a second lock.
    pub fn append_and_get(&self, mut make_entry: impl FnMut(u64) -> T) -> (u64, T) {
        let mut inner = self.inner.lock();
        inner.cursor += 1;
        let id = inner.cursor;
        let entry = make_entry(id);
        let slot = ((id - 1) as usize) % inner.capacity;
        inner.slots[slot] = Some(entry.clone());
        (id, entry)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.cursor = 0;
        for slot in inner.slots.iter_mut() {
            *slot = None;
        }
    }

    pub fn count(&self) -> usize {
        self.inner.lock().count()
    }

    pub fn first_id(&self) -> u64 {
        self.inner.lock().first_id()
    }

    pub fn last_id(&self) -> u64 {
        self.inner.lock().cursor
    }

    /// All live entries, oldest first (used by HAR export, spec §4.2
    /// `snapshot()`).
    pub fn snapshot(&self) -> Vec<T> {
        let inner = self.inner.lock();
        newest_first_positions(&inner).into_iter().rev().map(|i| {
            inner.slots[i].clone().expect("live position must be occupied")
        }).collect()
    }

    /// Up to `limit` entries starting at the `offset`-th most-recently
    /// appended (0 = newest), after applying `filter` if given. `total` is
    /// the number of entries matching `filter` (or the live count, if no
    /// filter) found during the walk.
    pub fn page(&self, offset: usize, limit: usize, filter: Option<&dyn Fn(&T) -> bool>) -> Page<T> {
        let inner = self.inner.lock();
        let positions = newest_first_positions(&inner);

        let mut matched = 0usize;
        let mut items = Vec::new();
        for pos in positions {
            let entry = inner.slots[pos]
                .as_ref()
                .expect("live position must be occupied");
            if let Some(f) = filter {
                if !f(entry) {
                    continue;
                }
            }
            if matched >= offset && items.len() < limit {
                items.push(entry.clone());
            }
            matched += 1;
        }

        Page {
            items,
            offset,
            limit,
            total: matched,
        }
    }
}

/// Occupied slot indices ordered newest-first.
fn newest_first_positions<T>(inner: &Inner<T>) -> Vec<usize> {
    let count = inner.count();
    let mut positions = Vec::with_capacity(count);
    let last_id = inner.cursor;
    for i in 0..count {
        let id = last_id - i as u64;
        let pos = ((id - 1) as usize) % inner.capacity;
        positions.push(pos);
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_of(capacity: usize, values: &[&str]) -> Store<String> {
        let store = Store::new(capacity);
        for v in values {
            let v = v.to_string();
            store.append(|_id| v.clone());
        }
        store
    }

    #[test]
    fn append_assigns_monotonic_ids_and_bounds_count() {
        let store: Store<String> = Store::new(3);
        for i in 1..=5u64 {
            let id = store.append(|id| {
                assert_eq!(id, i);
                format!("e{id}")
            });
            assert_eq!(id, i);
        }
        assert_eq!(store.count(), 3);
        assert_eq!(store.last_id(), 5);
        assert_eq!(store.first_id(), 3);
    }

    #[test]
    fn s1_capture_and_page() {
        // spec.md S1: MaxNetworkEntries=3, append a,b,c,d,e.
        let store = store_of(3, &["a", "b", "c", "d", "e"]);
        let page = store.page(0, 10, None);
        assert_eq!(page.total, 3);
        assert_eq!(page.offset, 0);
        assert_eq!(page.limit, 10);
        assert_eq!(page.items, vec!["e", "d", "c"]);
    }

    #[test]
    fn page_without_modification_matches_snapshot_window() {
        let store = store_of(10, &["a", "b", "c", "d", "e"]);
        let snapshot = store.snapshot(); // oldest-first
        let page = store.page(1, 2, None);
        // newest-first order for offset=1,limit=2 -> items at snapshot indices [3,2]
        assert_eq!(page.items, vec![snapshot[3].clone(), snapshot[2].clone()]);
        assert_eq!(page.total, 5);
    }

    #[test]
    fn clear_resets_everything() {
        let store = store_of(3, &["a", "b"]);
        store.clear();
        assert_eq!(store.count(), 0);
        assert_eq!(store.last_id(), 0);
        assert_eq!(store.first_id(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn filter_applies_during_walk_and_total_reflects_matches() {
        let store: Store<i32> = Store::new(10);
        for v in [1, 2, 3, 4, 5, 6] {
            store.append(move |_| v);
        }
        let even = |v: &i32| v % 2 == 0;
        let page = store.page(0, 100, Some(&even));
        assert_eq!(page.items, vec![6, 4, 2]);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn snapshot_is_oldest_first() {
        let store = store_of(3, &["a", "b", "c", "d"]);
        assert_eq!(store.snapshot(), vec!["b", "c", "d"]);
    }
}
