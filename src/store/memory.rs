//! In-memory store
//!
//! Backs the file store and the unit tests.

use super::{KeyMatcher, KeyValueStore};
use crate::error::PaladinResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Store keeping every value in a concurrent map
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        let store = Self::new();
        for (key, value) in entries {
            store.values.insert(key, value);
        }
        store
    }

    /// Copy of the whole keyspace, ordered by key
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn get_sync(&self, key: &str) -> Option<Vec<u8>> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    /// Put back a value captured by `get_sync`, removing the key if it was absent
    pub(crate) fn restore(&self, key: &str, previous: Option<Vec<u8>>) {
        match previous {
            Some(value) => {
                self.values.insert(key.to_string(), value);
            }
            None => {
                self.values.remove(key);
            }
        }
    }

    pub(crate) fn incr_sync(&self, key: &str) -> u64 {
        let mut entry = self.values.entry(key.to_string()).or_default();
        let current = std::str::from_utf8(entry.value())
            .ok()
            .and_then(|text| text.parse::<u64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        *entry.value_mut() = next.to_string().into_bytes();
        next
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PaladinResult<Option<Vec<u8>>> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> PaladinResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> PaladinResult<Vec<String>> {
        let matcher = KeyMatcher::new(pattern);
        let mut keys: Vec<String> = self
            .values
            .iter()
            .filter(|entry| matcher.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn incr(&self, key: &str) -> PaladinResult<u64> {
        Ok(self.incr_sync(key))
    }
}
