//! Association map - key/value pairs kept as an ordered list
//!
//! The boundary form is a plain buffer of entries, so lookup is linear and
//! insertion order is the only order. Duplicate keys are legal.
//!
//! Lookup policy: the FIRST matching entry wins. [`FfiMap::get`],
//! [`FfiMap::index`], [`OrderedMap::get`] and [`OrderedMap::into_hash_map`]
//! all follow it; `get_all` exposes every match in order.

use super::buffer::FfiArray;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// One key/value pair
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FfiMapEntry<K, V> {
    pub key: K,
    pub value: V,
}

pub type FfiMap<K, V> = FfiArray<FfiMapEntry<K, V>>;

impl<K, V> FfiArray<FfiMapEntry<K, V>> {
    /// Build from pairs, keeping their order
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        Self::from_vec(
            pairs
                .into_iter()
                .map(|(key, value)| FfiMapEntry { key, value })
                .collect(),
        )
    }

    /// Walk the entries in insertion order. Restartable.
    ///
    /// # Safety
    /// The header must be valid and its storage still allocated.
    pub unsafe fn entries(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.iter().map(|entry| (&entry.key, &entry.value))
    }

    /// Value of the first entry whose key matches
    ///
    /// # Safety
    /// Same as [`FfiMap::entries`].
    pub unsafe fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized,
        K: PartialEq<Q>,
    {
        self.iter()
            .find(|entry| entry.key == *key)
            .map(|entry| &entry.value)
    }

    /// Every value whose key matches, in insertion order
    ///
    /// # Safety
    /// Same as [`FfiMap::entries`].
    pub unsafe fn get_all<'a, Q>(&'a self, key: &'a Q) -> impl Iterator<Item = &'a V> + 'a
    where
        Q: ?Sized,
        K: PartialEq<Q>,
    {
        self.iter()
            .filter(move |entry| entry.key == *key)
            .map(|entry| &entry.value)
    }

    /// Local hash index over the borrowed entries, first match wins
    ///
    /// # Safety
    /// Same as [`FfiMap::entries`].
    pub unsafe fn index(&self) -> HashMap<&K, &V>
    where
        K: Hash + Eq,
    {
        let mut index = HashMap::with_capacity(self.len());
        for (key, value) in self.entries() {
            index.entry(key).or_insert(value);
        }
        index
    }
}

/// Owned ordered map, the Rust-side twin of [`FfiMap`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedMap<K, V> {
    entries: Vec<(K, V)>,
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<K, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair. Existing entries with the same key are kept.
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized,
        K: PartialEq<Q>,
    {
        self.entries.iter().find(|(k, _)| *k == *key).map(|(_, v)| v)
    }

    pub fn get_all<'a, Q>(&'a self, key: &'a Q) -> impl Iterator<Item = &'a V> + 'a
    where
        Q: ?Sized,
        K: PartialEq<Q>,
    {
        self.entries
            .iter()
            .filter(move |(k, _)| *k == *key)
            .map(|(_, v)| v)
    }

    /// Collapse into a hash map. Later duplicates are dropped.
    pub fn into_hash_map(self) -> HashMap<K, V>
    where
        K: Hash + Eq,
    {
        let mut map = HashMap::with_capacity(self.entries.len());
        for (key, value) in self.entries {
            map.entry(key).or_insert(value);
        }
        map
    }

    pub fn into_entries(self) -> Vec<(K, V)> {
        self.entries
    }
}

impl<K, V> From<Vec<(K, V)>> for OrderedMap<K, V> {
    fn from(entries: Vec<(K, V)>) -> Self {
        Self { entries }
    }
}

impl<K, V> FromIterator<(K, V)> for OrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<K, V> IntoIterator for OrderedMap<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
