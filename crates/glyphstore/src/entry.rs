//! Payload records keyed by cache key
//!
//! Each real key owns exactly one payload record, named by the decimal key.
//! Link records live beside them under a different name and are never
//! touched from here.

use crate::error::{Error, Result};
use crate::key::Key;
use crate::parser::{parse_record_name, payload_name, RecordName};
use crate::storage::{OpenMode, Record, Storage};

/// Durable key -> payload blob store
#[derive(Debug, Clone)]
pub struct EntryStore<S> {
    storage: S,
}

impl<S: Storage> EntryStore<S> {
    /// Wrap a storage backend
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Underlying storage backend
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Create or truncate the payload record for `key` and write `bytes`
    pub fn write(&self, key: Key, bytes: &[u8]) -> Result<()> {
        let key = real(key)?;
        let mut record = self.storage.open(&payload_name(key), OpenMode::Truncate)?;
        if let Err(e) = record.write_all(bytes) {
            // Surface the write failure, not a secondary close failure
            let _ = record.close();
            return Err(e);
        }
        record.close()
    }

    /// Read the full payload for `key`
    pub fn read(&self, key: Key) -> Result<Vec<u8>> {
        let mut record = self.open(key)?;
        let bytes = record.read_to_end()?;
        record.close()?;
        Ok(bytes)
    }

    /// Open the payload for `key` read-only, for incremental reads
    pub fn open(&self, key: Key) -> Result<S::Record> {
        let key = real(key)?;
        self.storage.open(&payload_name(key), OpenMode::ReadOnly)
    }

    /// Remove the payload record for `key`
    pub fn delete(&self, key: Key) -> Result<()> {
        let key = real(key)?;
        self.storage.delete(&payload_name(key))
    }

    /// Check whether `key` has a payload record
    pub fn contains(&self, key: Key) -> Result<bool> {
        let key = real(key)?;
        self.storage.exists(&payload_name(key))
    }

    /// Keys that currently have payload records
    ///
    /// The directory is listed once up front; records created or deleted
    /// while iterating are not reflected.
    pub fn enumerate(&self) -> Result<impl Iterator<Item = Key>> {
        let names = self.storage.list()?;
        Ok(names
            .into_iter()
            .filter_map(|name| match parse_record_name(&name) {
                Some(RecordName::Payload(key)) if !key.is_sentinel() => Some(key),
                _ => None,
            }))
    }
}

fn real(key: Key) -> Result<Key> {
    if key.is_sentinel() {
        return Err(Error::ReservedKey(key.get()));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemStorage;
    use crate::storage::DirStorage;
    use tempfile::TempDir;

    fn key(raw: u16) -> Key {
        Key::new(raw).unwrap()
    }

    #[test]
    fn test_write_and_read() {
        let store = EntryStore::new(MemStorage::new());

        store.write(key(65), b"glyph A").unwrap();
        assert_eq!(store.read(key(65)).unwrap(), b"glyph A");
        assert!(store.contains(key(65)).unwrap());
    }

    #[test]
    fn test_write_truncates() {
        let store = EntryStore::new(MemStorage::new());

        store.write(key(65), b"a much longer glyph").unwrap();
        store.write(key(65), b"short").unwrap();
        assert_eq!(store.read(key(65)).unwrap(), b"short");
    }

    #[test]
    fn test_write_leaves_other_records() {
        let storage = MemStorage::new();
        storage.poke("65.lnk", &[1, 2, 3, 4]);
        let store = EntryStore::new(storage.clone());

        store.write(key(65), b"payload").unwrap();
        store.write(key(66), b"other").unwrap();

        assert_eq!(storage.snapshot("65.lnk").unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(store.read(key(65)).unwrap(), b"payload");
    }

    #[test]
    fn test_read_missing() {
        let store = EntryStore::new(MemStorage::new());

        assert!(matches!(store.read(key(1)), Err(Error::NotFound)));
        assert!(matches!(store.delete(key(1)), Err(Error::NotFound)));
        assert!(!store.contains(key(1)).unwrap());
    }

    #[test]
    fn test_sentinels_rejected() {
        let store = EntryStore::new(MemStorage::new());

        assert!(matches!(store.write(Key::HEAD, b"x"), Err(Error::ReservedKey(0))));
        assert!(matches!(store.read(Key::TAIL), Err(Error::ReservedKey(0xFFFF))));
    }

    #[test]
    fn test_open_streams_payload() {
        let store = EntryStore::new(MemStorage::new());
        store.write(key(300), &[5u8; 1000]).unwrap();

        let mut record = store.open(key(300)).unwrap();
        let mut first = [0u8; 10];
        record.read_exact(&mut first).unwrap();
        assert_eq!(first, [5u8; 10]);
        assert_eq!(record.read_to_end().unwrap().len(), 990);
    }

    #[test]
    fn test_enumerate_skips_links_and_foreign_names() {
        let storage = MemStorage::new();
        for name in ["0.lnk", "65535.lnk", "12.lnk", "notes.txt", "0"] {
            storage.poke(name, b"");
        }
        let store = EntryStore::new(storage);
        store.write(key(12), b"x").unwrap();
        store.write(key(40), b"y").unwrap();

        let mut keys: Vec<_> = store.enumerate().unwrap().collect();
        keys.sort();
        assert_eq!(keys, vec![key(12), key(40)]);
    }

    #[test]
    fn test_out_of_space() {
        let store = EntryStore::new(MemStorage::with_quota(4));
        assert!(matches!(store.write(key(1), b"too big"), Err(Error::OutOfSpace)));
    }

    #[test]
    fn test_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = EntryStore::new(DirStorage::open(dir.path()).unwrap());

        store.write(key(20013), b"zhong").unwrap();
        assert!(dir.path().join("20013").exists());
        assert_eq!(store.read(key(20013)).unwrap(), b"zhong");

        store.delete(key(20013)).unwrap();
        assert!(!dir.path().join("20013").exists());
    }
}
