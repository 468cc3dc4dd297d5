//! Single-record key-value store on raw flash
//!
//! All entries live in one record at a fixed, sector-aligned offset:
//!
//! | Bytes            | Content                              |
//! |------------------|--------------------------------------|
//! | `0..4`           | magic, little endian                 |
//! | `4`              | record format version                |
//! | `5..7`           | payload length, little endian        |
//! | `7..7+len`       | postcard-encoded entry list          |
//! | `RECORD_LEN - 1` | checksum over every preceding byte   |
//!
//! A commit rewrites the whole record with one `Storage::write`, so a reader
//! either sees the previous record or the new one. A torn write fails the
//! checksum and loads as an empty store.

use embedded_storage::{ReadStorage, Storage};
use heapless::{String, Vec};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{
    KEY_CAPACITY, KeyValueStore, StorageError, StoredValue, VALUE_CAPACITY, check_lengths,
    to_stored,
};

const RECORD_MAGIC: u32 = 0x5449_434B; // "TICK"
const RECORD_VERSION: u8 = 1;
const HEADER_LEN: usize = 7;

/// Size of the on-flash record in bytes
pub const RECORD_LEN: usize = 1024;

/// Maximum number of entries across all namespaces
pub const MAX_ENTRIES: usize = 6;

const PAYLOAD_CAPACITY: usize = RECORD_LEN - HEADER_LEN - 1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct Entry {
    namespace: String<KEY_CAPACITY>,
    key: String<KEY_CAPACITY>,
    value: String<VALUE_CAPACITY>,
}

impl Entry {
    fn matches(&self, namespace: &str, key: &str) -> bool {
        self.namespace == namespace && self.key == key
    }
}

type Entries = Vec<Entry, MAX_ENTRIES>;

/// [`KeyValueStore`] over any `embedded-storage` flash device.
pub struct FlashKvStore<F> {
    flash: F,
    offset: u32,
    entries: Entries,
    loaded: bool,
}

impl<F> FlashKvStore<F>
where
    F: ReadStorage + Storage,
{
    /// Create a store whose record lives at `offset` (should be sector aligned).
    pub fn new(flash: F, offset: u32) -> Self {
        Self {
            flash,
            offset,
            entries: Vec::new(),
            loaded: false,
        }
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    fn ensure_loaded(&mut self) -> Result<(), StorageError> {
        if self.loaded {
            return Ok(());
        }

        let mut record = [0u8; RECORD_LEN];
        self.flash
            .read(self.offset, &mut record)
            .map_err(|_| StorageError::Unavailable)?;

        self.entries = match decode_record(&record) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Discarding stored record at {:#x}: {}", self.offset, e);
                Vec::new()
            }
        };
        debug!(
            "Loaded {} entries from record at {:#x}",
            self.entries.len(),
            self.offset
        );
        self.loaded = true;
        Ok(())
    }
}

impl<F> KeyValueStore for FlashKvStore<F>
where
    F: ReadStorage + Storage,
{
    fn read(&mut self, namespace: &str, key: &str) -> Result<Option<StoredValue>, StorageError> {
        self.ensure_loaded()?;
        self.entries
            .iter()
            .find(|entry| entry.matches(namespace, key))
            .map(|entry| to_stored(&entry.value))
            .transpose()
    }

    fn write(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        check_lengths(namespace, key, value)?;
        self.ensure_loaded()?;

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.matches(namespace, key))
        {
            entry.value = to_stored(value)?;
            return Ok(());
        }

        let mut entry = Entry {
            namespace: String::new(),
            key: String::new(),
            value: to_stored(value)?,
        };
        entry
            .namespace
            .push_str(namespace)
            .map_err(|_| StorageError::TooLong)?;
        entry.key.push_str(key).map_err(|_| StorageError::TooLong)?;
        self.entries
            .push(entry)
            .map_err(|_| StorageError::RecordFull)
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.ensure_loaded()?;
        self.entries.retain(|entry| !entry.matches(namespace, key));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.ensure_loaded()?;
        let mut record = [0u8; RECORD_LEN];
        encode_record(&self.entries, &mut record)?;
        self.flash
            .write(self.offset, &record)
            .map_err(|_| StorageError::Unavailable)?;
        debug!(
            "Committed {} entries to record at {:#x}",
            self.entries.len(),
            self.offset
        );
        Ok(())
    }

    fn discard(&mut self) {
        // Next access reloads from flash.
        self.entries.clear();
        self.loaded = false;
    }
}

fn encode_record(entries: &Entries, record: &mut [u8; RECORD_LEN]) -> Result<(), StorageError> {
    record.fill(0xFF);
    record[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    record[4] = RECORD_VERSION;

    let payload = &mut record[HEADER_LEN..HEADER_LEN + PAYLOAD_CAPACITY];
    let used = postcard::to_slice(entries, payload)
        .map_err(|_| StorageError::Encoding)?
        .len();
    record[5..7].copy_from_slice(&(used as u16).to_le_bytes());
    record[RECORD_LEN - 1] = checksum8(&record[..RECORD_LEN - 1]);
    Ok(())
}

fn decode_record(record: &[u8; RECORD_LEN]) -> Result<Entries, StorageError> {
    // Erased flash: nothing was ever stored.
    if record.iter().all(|&byte| byte == 0xFF) {
        return Ok(Vec::new());
    }
    if u32::from_le_bytes([record[0], record[1], record[2], record[3]]) != RECORD_MAGIC
        || record[4] != RECORD_VERSION
    {
        return Err(StorageError::Corrupt);
    }
    if record[RECORD_LEN - 1] != checksum8(&record[..RECORD_LEN - 1]) {
        return Err(StorageError::Corrupt);
    }

    let used = u16::from_le_bytes([record[5], record[6]]) as usize;
    if used > PAYLOAD_CAPACITY {
        return Err(StorageError::Corrupt);
    }
    postcard::from_bytes(&record[HEADER_LEN..HEADER_LEN + used]).map_err(|_| StorageError::Corrupt)
}

fn checksum8(bytes: &[u8]) -> u8 {
    let mut acc = 0x5Au8;
    for &byte in bytes {
        acc ^= byte.rotate_left(1);
    }
    acc
}
