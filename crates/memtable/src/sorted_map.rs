//! In-memory ordered map from key to value-or-tombstone.
//!
//! Backed by a concurrent skip list ([`crossbeam_skiplist::SkipMap`]):
//! lock-free readers, `&self` insertion, ascending iteration. The wrapper
//! owns the tombstone convention (`None` value) and copies inputs on insert
//! so callers may reuse their buffers.

use crossbeam_skiplist::SkipMap;

/// Ordered mapping from byte key to value-or-tombstone.
///
/// Keys compare by lexicographic unsigned byte order. At most one entry
/// exists per key; inserting an existing key replaces its value.
pub struct SortedMap {
    map: SkipMap<Vec<u8>, Option<Vec<u8>>>,
}

impl SortedMap {
    pub fn new() -> Self {
        Self { map: SkipMap::new() }
    }

    /// Adds or replaces an entry. `value == None` records a tombstone.
    ///
    /// Both key and value are deep-copied.
    pub fn insert(&self, key: &[u8], value: Option<&[u8]>) {
        self.map.insert(key.to_vec(), value.map(<[u8]>::to_vec));
    }

    /// Returns the stored value, or `None` if the key is absent **or** the
    /// stored entry is a tombstone.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).and_then(|e| e.value().clone())
    }

    /// Tombstone-aware lookup: `None` when the key is absent, `Some(None)`
    /// for a tombstone, `Some(Some(value))` for a live entry.
    ///
    /// The read path needs the distinction: a tombstone terminates the
    /// search where an absent key lets it continue to older tables.
    #[must_use]
    pub fn entry(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.map.get(key).map(|e| e.value().clone())
    }

    /// Number of entries, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Forward iterator in ascending key order, positioned on the first
    /// entry. Tombstones are yielded so they can be persisted.
    #[must_use]
    pub fn iter(&self) -> SortedMapIter<'_> {
        SortedMapIter::new(&self.map)
    }
}

impl Default for SortedMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward iterator over a [`SortedMap`].
///
/// Holds an owned copy of the current entry; `key`/`value` are valid only
/// while [`valid`](Self::valid) returns true. The engine only iterates
/// frozen memtables, so concurrent mutation is not a concern here.
pub struct SortedMapIter<'a> {
    inner: crossbeam_skiplist::map::Iter<'a, Vec<u8>, Option<Vec<u8>>>,
    current: Option<(Vec<u8>, Option<Vec<u8>>)>,
}

impl<'a> SortedMapIter<'a> {
    fn new(map: &'a SkipMap<Vec<u8>, Option<Vec<u8>>>) -> Self {
        let mut iter = Self {
            inner: map.iter(),
            current: None,
        };
        iter.advance();
        iter
    }

    /// True while the iterator is positioned on an entry.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// Current key; empty slice when invalid.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[], |(k, _)| k.as_slice())
    }

    /// Current value; `None` for a tombstone (or when invalid).
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.current
            .as_ref()
            .and_then(|(_, v)| v.as_deref())
    }

    /// Moves to the next entry in ascending key order.
    pub fn advance(&mut self) {
        self.current = self
            .inner
            .next()
            .map(|entry| (entry.key().clone(), entry.value().clone()));
    }
}
