//! Ordered map seam used by lock tables

use std::collections::BTreeMap;
use std::ops::Bound;

/// Ordered map with neighbour queries
///
/// Lock tables only need these operations from their segment index, so any
/// balanced tree can back a table.
pub trait OrderedMap<K: Ord, V>: Default + Send {
    /// Insert, returning the previous value for the key
    fn insert(&mut self, key: K, value: V) -> Option<V>;

    /// Remove a key
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Exact lookup
    fn get(&self, key: &K) -> Option<&V>;

    /// Exact mutable lookup
    fn get_mut(&mut self, key: &K) -> Option<&mut V>;

    /// Greatest entry with key `<= key`
    fn floor(&self, key: &K) -> Option<(&K, &V)>;

    /// Least entry with key `>= key`
    fn ceiling(&self, key: &K) -> Option<(&K, &V)>;

    /// Greatest entry with key `< key`
    fn predecessor(&self, key: &K) -> Option<(&K, &V)>;

    /// Least entry with key `> key`
    fn successor(&self, key: &K) -> Option<(&K, &V)>;

    /// Number of entries
    fn len(&self) -> usize;

    /// Whether the map is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in key order
    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_>;
}

impl<K: Ord + Send, V: Send> OrderedMap<K, V> for BTreeMap<K, V> {
    fn insert(&mut self, key: K, value: V) -> Option<V> {
        BTreeMap::insert(self, key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        BTreeMap::remove(self, key)
    }

    fn get(&self, key: &K) -> Option<&V> {
        BTreeMap::get(self, key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        BTreeMap::get_mut(self, key)
    }

    fn floor(&self, key: &K) -> Option<(&K, &V)> {
        self.range((Bound::Unbounded, Bound::Included(key))).next_back()
    }

    fn ceiling(&self, key: &K) -> Option<(&K, &V)> {
        self.range((Bound::Included(key), Bound::Unbounded)).next()
    }

    fn predecessor(&self, key: &K) -> Option<(&K, &V)> {
        self.range((Bound::Unbounded, Bound::Excluded(key))).next_back()
    }

    fn successor(&self, key: &K) -> Option<(&K, &V)> {
        self.range((Bound::Excluded(key), Bound::Unbounded)).next()
    }

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> {
        Box::new(self.iter())
    }
}
