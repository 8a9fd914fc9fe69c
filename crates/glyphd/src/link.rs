//! Outbound side of the peer link

use std::collections::HashSet;

use glyphcache::Key;

use crate::frame::Frame;

/// Something that can ask the peer to send a glyph
pub trait BlobRequester {
    /// Queue a one-way request for `key`
    ///
    /// Returns `false` if the key was already requested and has not arrived yet.
    fn request_blob(&mut self, key: Key) -> bool;

    /// Note that the peer delivered `key`, so it may be requested again
    fn blob_received(&mut self, key: Key);
}

/// Frames waiting to be written to the peer
///
/// Requested keys stay outstanding across [`Outbox::drain`] until the
/// matching download is stored.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Frame>,
    outstanding: HashSet<Key>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued frame, oldest first
    pub fn drain(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.pending)
    }
}

impl BlobRequester for Outbox {
    fn request_blob(&mut self, key: Key) -> bool {
        if !self.outstanding.insert(key) {
            return false;
        }
        self.pending.push(Frame::Request(key.get()));
        true
    }

    fn blob_received(&mut self, key: Key) {
        self.outstanding.remove(&key);
    }
}
