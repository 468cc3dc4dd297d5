//! RAM-backed store used by the simulator and tests

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use super::{KeyValueStore, StorageError, StoredValue, check_lengths, to_stored};

type EntryKey = (String, String);

/// In-memory [`KeyValueStore`] that can be switched offline to simulate a
/// missing or failing medium.
#[derive(Debug, Clone)]
pub struct MemoryKvStore {
    committed: BTreeMap<EntryKey, String>,
    staged: BTreeMap<EntryKey, String>,
    available: bool,
    commits: usize,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            committed: BTreeMap::new(),
            staged: BTreeMap::new(),
            available: true,
            commits: 0,
        }
    }

    /// Mark the medium as (un)available; every operation fails while unavailable.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Value as it exists on the "medium", ignoring staged writes
    pub fn committed_value(&self, namespace: &str, key: &str) -> Option<&str> {
        self.committed
            .get(&(namespace.to_string(), key.to_string()))
            .map(String::as_str)
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.available {
            Ok(())
        } else {
            Err(StorageError::Unavailable)
        }
    }
}

impl KeyValueStore for MemoryKvStore {
    fn read(&mut self, namespace: &str, key: &str) -> Result<Option<StoredValue>, StorageError> {
        self.ensure_available()?;
        self.staged
            .get(&(namespace.to_string(), key.to_string()))
            .map(|value| to_stored(value))
            .transpose()
    }

    fn write(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_available()?;
        check_lengths(namespace, key, value)?;
        self.staged
            .insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.ensure_available()?;
        self.staged
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.ensure_available()?;
        self.committed = self.staged.clone();
        self.commits += 1;
        Ok(())
    }

    fn discard(&mut self) {
        self.staged = self.committed.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_writes_invisible_until_commit() {
        let mut store = MemoryKvStore::new();
        store.write("ns", "key", "value").unwrap();

        assert_eq!(store.read("ns", "key").unwrap().as_deref(), Some("value"));
        assert_eq!(store.committed_value("ns", "key"), None);

        store.commit().unwrap();
        assert_eq!(store.committed_value("ns", "key"), Some("value"));
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_discard_restores_committed_state() {
        let mut store = MemoryKvStore::new();
        store.write("ns", "key", "old").unwrap();
        store.commit().unwrap();

        store.write("ns", "key", "new").unwrap();
        store.discard();
        assert_eq!(store.read("ns", "key").unwrap().as_deref(), Some("old"));
    }

    #[test]
    fn test_unavailable_store_fails_every_operation() {
        let mut store = MemoryKvStore::new();
        store.set_available(false);

        assert_eq!(store.read("ns", "key"), Err(StorageError::Unavailable));
        assert_eq!(store.write("ns", "key", "v"), Err(StorageError::Unavailable));
        assert_eq!(store.commit(), Err(StorageError::Unavailable));
    }

    #[test]
    fn test_oversize_value_rejected() {
        let mut store = MemoryKvStore::new();
        let long = "v".repeat(super::super::VALUE_CAPACITY + 1);
        assert_eq!(store.write("ns", "key", &long), Err(StorageError::TooLong));
    }
}
