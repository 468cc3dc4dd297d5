//! Durable key-value storage for configuration records
//!
//! The [`KeyValueStore`] trait is the seam between the configuration adapter
//! and whatever medium actually holds the bytes. Writes are staged until
//! [`KeyValueStore::commit`], which is what lets [`ConfigStore`] update both
//! configuration fields as a single unit.

pub mod config_store;
pub mod flash_kv;
pub mod memory;

pub use config_store::*;
pub use flash_kv::FlashKvStore;
pub use memory::MemoryKvStore;

use core::cell::RefCell;
use heapless::String;
use thiserror_no_std::Error;

/// Maximum length of a namespace or key name
pub const KEY_CAPACITY: usize = 16;

/// Maximum length of a stored value
pub const VALUE_CAPACITY: usize = 64;

pub type StoredValue = String<VALUE_CAPACITY>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage medium unavailable")]
    Unavailable,
    #[error("stored record is corrupt")]
    Corrupt,
    #[error("record encoding failed")]
    Encoding,
    #[error("record has no room for another entry")]
    RecordFull,
    #[error("key or value exceeds its capacity")]
    TooLong,
}

/// Namespaced string records with staged writes.
///
/// Reads observe staged writes. Nothing reaches the medium until `commit`
/// succeeds, and `discard` drops every staged change.
pub trait KeyValueStore {
    fn read(&mut self, namespace: &str, key: &str) -> Result<Option<StoredValue>, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn commit(&mut self) -> Result<(), StorageError>;

    fn discard(&mut self);
}

/// Lets several owners on the same task share one store.
impl<S: KeyValueStore> KeyValueStore for &RefCell<S> {
    fn read(&mut self, namespace: &str, key: &str) -> Result<Option<StoredValue>, StorageError> {
        self.borrow_mut().read(namespace, key)
    }

    fn write(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.borrow_mut().write(namespace, key, value)
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.borrow_mut().remove(namespace, key)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.borrow_mut().commit()
    }

    fn discard(&mut self) {
        self.borrow_mut().discard()
    }
}

fn check_lengths(namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
    if namespace.len() > KEY_CAPACITY || key.len() > KEY_CAPACITY || value.len() > VALUE_CAPACITY
    {
        return Err(StorageError::TooLong);
    }
    Ok(())
}

fn to_stored(value: &str) -> Result<StoredValue, StorageError> {
    let mut stored = StoredValue::new();
    stored.push_str(value).map_err(|_| StorageError::TooLong)?;
    Ok(stored)
}
