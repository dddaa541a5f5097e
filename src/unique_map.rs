//! Insertion-ordered map that rejects duplicate keys

use indexmap::IndexMap;

use crate::errors::{Error, Result};

/// A `String`-keyed map that refuses to overwrite an existing key.
///
/// Registries use this wherever a duplicate identifier must surface
/// immediately instead of silently replacing an earlier entry. Iteration
/// follows insertion order.
#[derive(Debug)]
pub struct UniqueMap<V> {
    inner: IndexMap<String, V>,
}

impl<V> UniqueMap<V> {
    pub fn new() -> Self {
        Self {
            inner: IndexMap::new(),
        }
    }

    /// Insert a value under a key that must not already be present.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Result<()> {
        let key = key.into();
        if self.inner.contains_key(&key) {
            return Err(Error::NotUnique(key));
        }
        self.inner.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.inner.get(key)
    }

    /// Remove a key, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.inner.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl<V> Default for UniqueMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
