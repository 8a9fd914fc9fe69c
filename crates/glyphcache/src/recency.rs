//! Recency index kept entirely in storage
//!
//! A circular doubly-linked list whose nodes are link records, one per key.
//! Two fixed sentinels anchor the ring:
//!
//! ```text
//! HEAD -> most recent -> ... -> least recent -> TAIL -> (HEAD)
//! ```
//!
//! Nothing but the handful of records touched by the current operation is
//! ever held in memory. Each mutation is a short sequence of record reads and
//! seek-then-writes. They are not atomic: a storage failure part way leaves
//! the ring inconsistent until [`RecencyIndex::clear`] runs.

use std::fmt;

use glyphstore::{
    encode_key, link_name, parse_link_record, parse_record_name, Error, Key, LinkRecord, OpenMode,
    Record, RecordName, Result, Storage, LINK_RECORD_LEN, NEXT_OFFSET, PREV_OFFSET,
};
use tracing::warn;

/// Longest possible walk: every real key plus `TAIL`
const MAX_WALK: usize = u16::MAX as usize;

/// Error returned when the ring's structural invariants do not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

impl From<Error> for InvariantError {
    fn from(err: Error) -> Self {
        InvariantError(err.to_string())
    }
}

/// LRU order over cache keys, stored as link records
#[derive(Debug, Clone)]
pub struct RecencyIndex<S> {
    storage: S,
}

impl<S: Storage> RecencyIndex<S> {
    /// Wrap a storage backend
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Ensure both sentinel records exist, creating an empty ring if not
    pub fn init(&self) -> Result<()> {
        let head = self.storage.exists(&link_name(Key::HEAD))?;
        let tail = self.storage.exists(&link_name(Key::TAIL))?;
        if head && tail {
            return Ok(());
        }
        self.reset_sentinels()
    }

    /// Delete every link record and start over with an empty ring
    pub fn clear(&self) -> Result<()> {
        for name in self.storage.list()? {
            if let Some(RecordName::Link(_)) = parse_record_name(&name) {
                match self.storage.delete(&name) {
                    Ok(()) | Err(Error::NotFound) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        self.reset_sentinels()
    }

    /// Link a key in as the most recently used
    ///
    /// Fails with `AlreadyLinked` if the key is already in the ring.
    pub fn insert_most_recent(&self, key: Key) -> Result<()> {
        let key = real(key)?;
        if self.contains(key)? {
            return Err(Error::AlreadyLinked(key.get()));
        }

        let old_first = self.neighbours(Key::HEAD)?.next;
        // Until HEAD points at the new record nothing else refers to it
        if let Err(e) = self
            .write_link(key, LinkRecord::new(Key::HEAD, old_first))
            .and_then(|()| self.patch(Key::HEAD, NEXT_OFFSET, key))
        {
            self.discard_link(key);
            return Err(e);
        }
        // When the ring was empty old_first is TAIL, so this sets TAIL.prev
        self.patch(old_first, PREV_OFFSET, key)
    }

    /// Unlink a key and drop its link record
    ///
    /// Fails with `NotFound` if the key is not in the ring.
    pub fn remove(&self, key: Key) -> Result<()> {
        let key = real(key)?;
        let link = self.read_link(key)?;
        self.detach(link)?;
        self.storage.delete(&link_name(key))
    }

    /// Move a key to the most-recent position
    ///
    /// Returns `false` when the key already was the most recent.
    pub fn promote_most_recent(&self, key: Key) -> Result<bool> {
        let key = real(key)?;
        let link = self.read_link(key)?;
        if link.prev == Key::HEAD {
            return Ok(false);
        }
        self.detach(link)?;
        // link_first rewrites the whole record, no need to delete it first
        self.link_first(key)?;
        Ok(true)
    }

    /// Unlink the least recently used key and return it
    ///
    /// Fails with `CapacityViolation` when the ring holds no real keys.
    pub fn evict_oldest(&self) -> Result<Key> {
        let victim = self.neighbours(Key::TAIL)?.prev;
        if victim == Key::HEAD {
            return Err(Error::CapacityViolation);
        }
        if victim.is_sentinel() {
            return Err(Error::Corrupt(format!("TAIL.prev points at {}", victim)));
        }

        let link = self.neighbours(victim)?;
        self.detach(link)?;
        self.storage.delete(&link_name(victim))?;
        Ok(victim)
    }

    /// Whether a key has a link record
    pub fn contains(&self, key: Key) -> Result<bool> {
        self.storage.exists(&link_name(key))
    }

    /// The most recently used key, if any
    pub fn most_recent(&self) -> Result<Option<Key>> {
        let first = self.neighbours(Key::HEAD)?.next;
        Ok((first != Key::TAIL).then_some(first))
    }

    /// The least recently used key, if any
    pub fn least_recent(&self) -> Result<Option<Key>> {
        let last = self.neighbours(Key::TAIL)?.prev;
        Ok((last != Key::HEAD).then_some(last))
    }

    /// Real keys from most to least recent
    ///
    /// Fails with `Corrupt` if following `next` from `HEAD` does not reach
    /// `TAIL`. This reads every link record and is meant for startup
    /// recovery and diagnostics, not the hot path.
    pub fn walk(&self) -> Result<Vec<Key>> {
        self.collect(Key::HEAD, Key::TAIL, |link| link.next)
    }

    /// Real keys from least to most recent, following `prev` from `TAIL`
    pub fn walk_backward(&self) -> Result<Vec<Key>> {
        self.collect(Key::TAIL, Key::HEAD, |link| link.prev)
    }

    /// Verify the ring is a single closed cycle with consistent back links
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        let forward = self.walk()?;

        let mut prev = Key::HEAD;
        for &key in forward.iter().chain(std::iter::once(&Key::TAIL)) {
            let link = self.neighbours(key)?;
            if link.prev != prev {
                return Err(InvariantError::new(format!(
                    "{}.prev is {}, expected {}",
                    key, link.prev, prev
                )));
            }
            prev = key;
        }

        let mut backward = self.walk_backward()?;
        backward.reverse();
        if backward != forward {
            return Err(InvariantError::new(format!(
                "forward walk {:?} disagrees with backward walk {:?}",
                forward, backward
            )));
        }
        Ok(())
    }

    fn collect(&self, from: Key, to: Key, step: impl Fn(LinkRecord) -> Key) -> Result<Vec<Key>> {
        let mut keys = Vec::new();
        let mut cur = step(self.neighbours(from)?);
        while cur != to {
            if cur == from || keys.len() >= MAX_WALK {
                return Err(Error::Corrupt(format!(
                    "ring from {} does not reach {}",
                    from, to
                )));
            }
            keys.push(cur);
            cur = step(self.neighbours(cur)?);
        }
        Ok(keys)
    }

    /// Relink a detached key as the most recent
    fn link_first(&self, key: Key) -> Result<()> {
        let old_first = self.neighbours(Key::HEAD)?.next;
        self.write_link(key, LinkRecord::new(Key::HEAD, old_first))?;
        self.patch(Key::HEAD, NEXT_OFFSET, key)?;
        // When the ring was empty old_first is TAIL, so this sets TAIL.prev
        self.patch(old_first, PREV_OFFSET, key)
    }

    /// Splice a record's neighbours together, leaving the record itself
    fn detach(&self, link: LinkRecord) -> Result<()> {
        self.patch(link.prev, NEXT_OFFSET, link.next)?;
        self.patch(link.next, PREV_OFFSET, link.prev)
    }

    /// Best-effort removal of a link record that never joined the ring
    fn discard_link(&self, key: Key) {
        match self.storage.delete(&link_name(key)) {
            Ok(()) | Err(Error::NotFound) => {}
            Err(e) => warn!(%key, error = %e, "failed to discard unlinked record"),
        }
    }

    fn reset_sentinels(&self) -> Result<()> {
        self.write_link(Key::HEAD, LinkRecord::new(Key::TAIL, Key::TAIL))?;
        self.write_link(Key::TAIL, LinkRecord::new(Key::HEAD, Key::HEAD))
    }

    fn read_link(&self, key: Key) -> Result<LinkRecord> {
        let mut record = self.storage.open(&link_name(key), OpenMode::ReadOnly)?;
        let mut buf = [0u8; LINK_RECORD_LEN];
        let result = record.read_exact(&mut buf);
        finish(record, result)?;
        parse_link_record(&buf)
    }

    /// Read a record the ring says must exist
    fn neighbours(&self, key: Key) -> Result<LinkRecord> {
        self.read_link(key).map_err(|e| dangling(key, e))
    }

    fn write_link(&self, key: Key, link: LinkRecord) -> Result<()> {
        let mut record = self.storage.open(&link_name(key), OpenMode::Truncate)?;
        let result = record.write_all(&link.encode());
        finish(record, result)
    }

    /// Overwrite one field of an existing link record in place
    fn patch(&self, key: Key, offset: u64, value: Key) -> Result<()> {
        let mut record = self
            .storage
            .open(&link_name(key), OpenMode::ReadWrite)
            .map_err(|e| dangling(key, e))?;
        let result = record
            .seek(offset)
            .and_then(|()| record.write_all(&encode_key(value)));
        finish(record, result)
    }
}

/// Close a record, reporting the operation's error ahead of a close error
fn finish<R: Record>(record: R, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => record.close(),
        Err(e) => {
            let _ = record.close();
            Err(e)
        }
    }
}

fn dangling(key: Key, err: Error) -> Error {
    match err {
        Error::NotFound => Error::Corrupt(format!("link record for {} is missing", key)),
        other => other,
    }
}

fn real(key: Key) -> Result<Key> {
    if key.is_sentinel() {
        return Err(Error::ReservedKey(key.get()));
    }
    Ok(key)
}
