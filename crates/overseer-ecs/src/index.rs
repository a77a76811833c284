//! A multi-map from key to an ordered set of values.
//!
//! [`Index`] backs every secondary lookup in the registry: entities by name,
//! entities by tag, and components by owning entity. A key never maps to an
//! empty bucket; removing the last value of a bucket removes the key.

use std::borrow::Borrow;
use std::collections::{btree_map, btree_set, BTreeMap, BTreeSet};
use std::iter;

/// Multi-map with automatic bucket pruning.
///
/// Iteration order is the `Ord` order of keys, then of values, so every
/// sequence produced by the index is deterministic. All iterators borrow the
/// index and can be restarted by calling the method again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index<K, V> {
    buckets: BTreeMap<K, BTreeSet<V>>,
}

impl<K: Ord, V: Ord> Index<K, V> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }

    /// Insert `value` under `key`, creating the bucket if needed.
    ///
    /// Returns `false` if the value was already present.
    pub fn add(&mut self, key: K, value: V) -> bool {
        self.buckets.entry(key).or_default().insert(value)
    }

    /// Remove a whole bucket, returning its values.
    pub fn delete_key<Q>(&mut self, key: &Q) -> Option<BTreeSet<V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.buckets.remove(key)
    }

    /// Remove a single value, pruning the bucket if it becomes empty.
    ///
    /// Returns `false` if the value was not present.
    pub fn delete<Q, R>(&mut self, key: &Q, value: &R) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Borrow<R>,
        R: Ord + ?Sized,
    {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return false;
        };
        let removed = bucket.remove(value);
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        removed
    }

    /// Values stored under `key`; empty for an unknown key.
    pub fn values<Q>(&self, key: &Q) -> Values<'_, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Values {
            inner: self.buckets.get(key).map(|bucket| bucket.iter()),
        }
    }

    /// All keys with at least one value.
    pub fn keys(&self) -> btree_map::Keys<'_, K, BTreeSet<V>> {
        self.buckets.keys()
    }

    /// Every `(key, value)` pair, flattened across buckets.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> + Clone + '_ {
        self.buckets
            .iter()
            .flat_map(|(key, bucket)| iter::repeat(key).zip(bucket.iter()))
    }

    /// Whether `value` is stored under `key`.
    pub fn contains<Q, R>(&self, key: &Q, value: &R) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Borrow<R>,
        R: Ord + ?Sized,
    {
        self.buckets
            .get(key)
            .is_some_and(|bucket| bucket.contains(value))
    }

    /// Whether `key` has a (necessarily non-empty) bucket.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.buckets.contains_key(key)
    }

    /// Number of values stored under `key`.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.buckets.get(key).map_or(0, BTreeSet::len)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop every bucket.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

impl<K: Ord, V: Ord> Default for Index<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Iterator over one bucket of an [`Index`].
#[derive(Debug)]
pub struct Values<'a, V> {
    inner: Option<btree_set::Iter<'a, V>>,
}

impl<V> Clone for Values<'_, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner
            .as_ref()
            .map_or((0, Some(0)), |inner| inner.size_hint())
    }
}

impl<V> ExactSizeIterator for Values<'_, V> {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
