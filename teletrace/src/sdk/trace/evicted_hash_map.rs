//! A bounded hash map that preserves insertion order.
use crate::{Key, KeyValue, Value};
use std::collections::HashMap;

/// A hash map with a capped number of entries.
///
/// Iteration yields entries in insertion order so serialized output is
/// deterministic. Updating an existing key keeps its original position.
/// Inserting a new key past the capacity drops the entry and increments the
/// dropped counter instead of aborting.
#[derive(Clone, Debug, PartialEq)]
pub struct EvictedHashMap {
    map: HashMap<Key, Value>,
    insertion_order: Vec<Key>,
    capacity: u32,
    dropped_count: u32,
}

impl EvictedHashMap {
    /// Create a new `EvictedHashMap` with a given capacity.
    pub fn new(capacity: u32, capacity_hint: usize) -> Self {
        EvictedHashMap {
            map: HashMap::with_capacity(capacity_hint.min(capacity as usize)),
            insertion_order: Vec::new(),
            capacity,
            dropped_count: 0,
        }
    }

    /// Inserts a key-value pair into the map.
    ///
    /// Empty keys and entries past the capacity are dropped and counted.
    pub fn insert(&mut self, item: KeyValue) {
        if item.key.as_str().is_empty() {
            self.dropped_count += 1;
            return;
        }

        // Updates keep the original insertion position.
        if let Some(value) = self.map.get_mut(&item.key) {
            *value = item.value;
            return;
        }

        if self.insertion_order.len() as u32 >= self.capacity {
            self.dropped_count += 1;
            return;
        }

        self.insertion_order.push(item.key.clone());
        self.map.insert(item.key, item.value);
    }

    /// Returns a reference to the value for a key, if present.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.map.get(key)
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The number of entries rejected because the map was at capacity.
    pub fn dropped_count(&self) -> u32 {
        self.dropped_count
    }

    /// Returns an iterator over the entries in insertion order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            map: &self.map,
            order: self.insertion_order.iter(),
        }
    }
}

/// An insertion-ordered iterator over the entries of an [`EvictedHashMap`].
#[derive(Debug)]
pub struct Iter<'a> {
    map: &'a HashMap<Key, Value>,
    order: std::slice::Iter<'a, Key>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let map = self.map;
        self.order
            .by_ref()
            .find_map(|key| map.get_key_value(key))
    }
}

impl<'a> IntoIterator for &'a EvictedHashMap {
    type Item = (&'a Key, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_over_capacity() {
        let capacity = 10;
        let mut map = EvictedHashMap::new(capacity, 0);

        for i in 0..=capacity {
            map.insert(Key::new(i.to_string()).bool(true))
        }

        assert_eq!(map.dropped_count(), 1);
        assert_eq!(map.len(), capacity as usize);
    }

    #[test]
    fn insertion_order_preserved() {
        let mut map = EvictedHashMap::new(16, 0);
        for key in ["one", "two", "three"] {
            map.insert(Key::new(key).i64(1));
        }
        // updating must not move the entry
        map.insert(Key::new("one").i64(2));

        let keys: Vec<&str> = map.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["one", "two", "three"]);
        assert_eq!(map.get(&Key::new("one")), Some(&Value::I64(2)));
    }

    #[test]
    fn empty_keys_rejected() {
        let mut map = EvictedHashMap::new(16, 0);
        map.insert(KeyValue::new("", "nope"));
        assert!(map.is_empty());
        assert_eq!(map.dropped_count(), 1);
    }
}
