//! Configuration store adapter
//!
//! Loads and saves [`ConfigParameters`] under a fixed namespace. Neither
//! direction ever fails the caller: a missing or unreadable record yields an
//! empty field, and a failed save is logged and otherwise ignored.

use log::{debug, info, warn};

use super::{KeyValueStore, StorageError};
use crate::config::{ConfigParameters, FieldId};

/// Namespace holding the ticker configuration records
pub const CONFIG_NAMESPACE: &str = "ticker";

pub struct ConfigStore<S> {
    store: S,
}

impl<S> ConfigStore<S>
where
    S: KeyValueStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load the last persisted configuration, defaulting missing fields to empty.
    pub fn load(&mut self) -> ConfigParameters {
        let mut config = ConfigParameters::default();

        for field in FieldId::ALL {
            match self.store.read(CONFIG_NAMESPACE, field.key()) {
                Ok(Some(value)) => {
                    if config.set_field(field, &value) {
                        warn!("Stored {} exceeded its capacity and was truncated", field.key());
                    }
                }
                Ok(None) => debug!("No stored value for {}", field.key()),
                Err(e) => warn!("Failed to read {}: {}; using empty default", field.key(), e),
            }
        }

        info!(
            "Loaded config: credential_key={} symbols=\"{}\"",
            config.masked_key(),
            config.symbol_list()
        );
        config
    }

    /// Persist both fields as one unit. Failures are logged, not returned.
    pub fn save(&mut self, config: &ConfigParameters) {
        match self.try_save(config) {
            Ok(()) => info!(
                "Saved config: credential_key={} symbols=\"{}\"",
                config.masked_key(),
                config.symbol_list()
            ),
            Err(e) => warn!("Failed to save config: {}; keeping in-memory values", e),
        }
    }

    /// Persist both fields, reporting the failure instead of logging it.
    ///
    /// On error every staged change is discarded, so the next `load` sees the
    /// previous configuration in full.
    pub fn try_save(&mut self, config: &ConfigParameters) -> Result<(), StorageError> {
        let result = self.stage(config).and_then(|()| self.store.commit());
        if result.is_err() {
            self.store.discard();
        }
        result
    }

    /// Remove both records from the medium.
    pub fn clear(&mut self) {
        let result = FieldId::ALL
            .into_iter()
            .try_for_each(|field| self.store.remove(CONFIG_NAMESPACE, field.key()))
            .and_then(|()| self.store.commit());

        match result {
            Ok(()) => info!("Cleared stored config"),
            Err(e) => {
                self.store.discard();
                warn!("Failed to clear config: {}", e);
            }
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    fn stage(&mut self, config: &ConfigParameters) -> Result<(), StorageError> {
        for field in FieldId::ALL {
            self.store
                .write(CONFIG_NAMESPACE, field.key(), config.field(field))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SYMBOL_LIST_CAPACITY;
    use crate::storage::MemoryKvStore;
    use core::cell::RefCell;

    #[test]
    fn test_load_from_empty_store_gives_empty_fields() {
        let mut store = ConfigStore::new(MemoryKvStore::new());
        let config = store.load();
        assert_eq!(config.credential_key(), "");
        assert_eq!(config.symbol_list(), "");
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let mut store = ConfigStore::new(MemoryKvStore::new());
        let config = ConfigParameters::new("abc123", "AAPL,AMZN");

        store.save(&config);
        assert_eq!(store.load(), config);
        assert_eq!(store.store().commit_count(), 1);
    }

    #[test]
    fn test_unavailable_store_loads_defaults() {
        let mut backing = MemoryKvStore::new();
        backing.set_available(false);
        let mut store = ConfigStore::new(backing);

        assert_eq!(store.load(), ConfigParameters::default());
    }

    #[test]
    fn test_failed_save_leaves_previous_config_intact() {
        let shared = RefCell::new(MemoryKvStore::new());
        let mut store = ConfigStore::new(&shared);
        let original = ConfigParameters::new("old-key", "MSFT");
        store.save(&original);

        shared.borrow_mut().set_available(false);
        let replacement = ConfigParameters::new("new-key", "AAPL");
        assert_eq!(store.try_save(&replacement), Err(StorageError::Unavailable));

        shared.borrow_mut().set_available(true);
        assert_eq!(store.load(), original);
    }

    #[test]
    fn test_oversize_stored_symbols_are_truncated_on_load() {
        let mut backing = MemoryKvStore::new();
        let long = "ABCD,".repeat(12);
        backing
            .write(CONFIG_NAMESPACE, FieldId::SymbolList.key(), long.trim_end_matches(','))
            .unwrap();
        backing.commit().unwrap();

        let config = ConfigStore::new(backing).load();
        assert!(config.symbol_list().len() <= SYMBOL_LIST_CAPACITY);
        assert!(config.symbols().all(|s| s == "ABCD"));
    }

    #[test]
    fn test_clear_removes_both_records() {
        let mut store = ConfigStore::new(MemoryKvStore::new());
        store.save(&ConfigParameters::new("abc123", "AAPL"));
        store.clear();

        assert!(store.load().is_empty());
        assert_eq!(
            store.store().committed_value(CONFIG_NAMESPACE, "symbols"),
            None
        );
    }
}
