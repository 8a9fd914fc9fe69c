//! In-memory storage backend
//!
//! Behaves like [`DirStorage`](crate::DirStorage) but keeps every record in
//! RAM. Used by tests and benches, and able to simulate a full device
//! (byte quota) or a flaky one (fault injection on the N-th operation).

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::storage::{OpenMode, Record, Storage};

type Buffer = Arc<RwLock<Vec<u8>>>;

struct Inner {
    records: RwLock<HashMap<String, Buffer, RandomState>>,
    /// Total bytes allowed across all records
    quota: Option<usize>,
    used: AtomicUsize,
    ops: AtomicU64,
    /// Operations left before an injected failure
    fault_in: Mutex<Option<u64>>,
}

impl Inner {
    /// Count one storage operation, failing it if a fault is due
    fn tick(&self) -> Result<()> {
        self.ops.fetch_add(1, Ordering::Relaxed);

        let mut fault_in = self.fault_in.lock();
        match *fault_in {
            Some(0) => {
                *fault_in = None;
                Err(Error::Io(io::Error::new(io::ErrorKind::Other, "injected fault")))
            }
            Some(n) => {
                *fault_in = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn reserve(&self, grow: usize) -> Result<()> {
        if let Some(quota) = self.quota {
            if self.used.load(Ordering::Relaxed) + grow > quota {
                return Err(Error::OutOfSpace);
            }
        }
        self.used.fetch_add(grow, Ordering::Relaxed);
        Ok(())
    }

    fn release(&self, shrink: usize) {
        self.used.fetch_sub(shrink, Ordering::Relaxed);
    }
}

/// Shared in-memory record directory
///
/// Cloning yields another handle onto the same records, so a test can hand
/// one clone to a cache and inspect the raw records through another.
#[derive(Clone)]
pub struct MemStorage {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStorage")
            .field("records", &self.inner.records.read().len())
            .field("used", &self.used_bytes())
            .field("quota", &self.inner.quota)
            .finish()
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStorage {
    /// Create an unbounded in-memory directory
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a directory that reports `OutOfSpace` beyond `quota` bytes
    pub fn with_quota(quota: usize) -> Self {
        Self::build(Some(quota))
    }

    fn build(quota: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: RwLock::new(HashMap::with_hasher(RandomState::new())),
                quota,
                used: AtomicUsize::new(0),
                ops: AtomicU64::new(0),
                fault_in: Mutex::new(None),
            }),
        }
    }

    /// Fail the operation after the next `n` succeed (`0` fails the very next one)
    pub fn fail_after(&self, n: u64) {
        *self.inner.fault_in.lock() = Some(n);
    }

    /// Cancel a pending injected fault
    pub fn clear_fault(&self) {
        *self.inner.fault_in.lock() = None;
    }

    /// Number of storage operations performed so far
    pub fn ops(&self) -> u64 {
        self.inner.ops.load(Ordering::Relaxed)
    }

    /// Bytes currently stored across all records
    pub fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }

    /// Copy of a record's raw bytes, bypassing operation accounting
    pub fn snapshot(&self, name: &str) -> Option<Vec<u8>> {
        self.inner
            .records
            .read()
            .get(name)
            .map(|buffer| buffer.read().clone())
    }

    /// Overwrite a record's raw bytes, bypassing quota and accounting
    pub fn poke(&self, name: &str, bytes: &[u8]) {
        let mut records = self.inner.records.write();
        let buffer = records
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())));
        let mut data = buffer.write();
        self.inner.release(data.len());
        self.inner.used.fetch_add(bytes.len(), Ordering::Relaxed);
        *data = bytes.to_vec();
    }
}

impl Storage for MemStorage {
    type Record = MemRecord;

    fn open(&self, name: &str, mode: OpenMode) -> Result<MemRecord> {
        self.inner.tick()?;

        let buffer = {
            let mut records = self.inner.records.write();
            match records.get(name).cloned() {
                Some(buffer) => buffer,
                None if !matches!(mode, OpenMode::Create | OpenMode::Truncate) => {
                    return Err(Error::NotFound)
                }
                None => {
                    let buffer = Arc::new(RwLock::new(Vec::new()));
                    records.insert(name.to_string(), Arc::clone(&buffer));
                    buffer
                }
            }
        };

        if mode == OpenMode::Truncate {
            let mut data = buffer.write();
            self.inner.release(data.len());
            data.clear();
        }

        Ok(MemRecord {
            storage: Arc::clone(&self.inner),
            buffer,
            pos: 0,
            writable: mode.is_writable(),
        })
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.inner.tick()?;

        match self.inner.records.write().remove(name) {
            Some(buffer) => {
                self.inner.release(buffer.read().len());
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        self.inner.tick()?;
        Ok(self.inner.records.read().keys().cloned().collect())
    }
}

/// An open in-memory record
pub struct MemRecord {
    storage: Arc<Inner>,
    buffer: Buffer,
    pos: usize,
    writable: bool,
}

impl std::fmt::Debug for MemRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemRecord")
            .field("len", &self.buffer.read().len())
            .field("pos", &self.pos)
            .field("writable", &self.writable)
            .finish()
    }
}

impl Record for MemRecord {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.storage.tick()?;

        let data = self.buffer.read();
        if self.pos >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - self.pos);
        buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.storage.tick()?;
        self.pos = usize::try_from(pos)
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, "seek out of range")))?;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.storage.tick()?;
        if !self.writable {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "record opened read-only",
            )));
        }

        let mut data = self.buffer.write();
        let end = self.pos + buf.len();
        if end > data.len() {
            self.storage.reserve(end - data.len())?;
            data.resize(end, 0);
        }
        data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.buffer.read().len() as u64)
    }

    fn close(self) -> Result<()> {
        self.storage.tick()
    }
}
