//! Key-value storage seam backing the alert subsystem.
//!
//! The agent itself only needs an in-memory store; the trait keeps the
//! alert layer indifferent to the backing so a persistent store can slot in
//! without touching the monitor or the service.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

use crate::core::errors::Result;

/// Minimal key-value capability the alert layer consumes.
pub trait KeyValueStorage: Send + Sync + std::fmt::Debug {
    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: Value) -> Result<()>;
    /// Fetch the value under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Value>>;
    /// Remove the value under `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
    /// All keys currently stored, in unspecified order.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Process-local key-value store.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStorage {
    entries: RwLock<HashMap<String, Value>>,
}

impl InMemoryKeyValueStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for InMemoryKeyValueStorage {
    fn put(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryKeyValueStorage, KeyValueStorage};
    use serde_json::json;

    #[test]
    fn put_get_replace() {
        let store = InMemoryKeyValueStorage::new();
        store.put("a", json!({"v": 1})).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!({"v": 1})));

        store.put("a", json!({"v": 2})).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!({"v": 2})));
    }

    #[test]
    fn get_absent_is_none() {
        let store = InMemoryKeyValueStorage::new();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = InMemoryKeyValueStorage::new();
        store.put("a", json!(1)).unwrap();
        store.delete("a").unwrap();
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn keys_lists_all_entries() {
        let store = InMemoryKeyValueStorage::new();
        store.put("x", json!(1)).unwrap();
        store.put("y", json!(2)).unwrap();
        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["x".to_string(), "y".to_string()]);
    }
}
