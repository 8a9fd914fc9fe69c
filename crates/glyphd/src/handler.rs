//! Frame handler for the glyph link

use glyphcache::{DirStorage, Error, GlyphCache, Key, Record};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::frame::{Frame, MAX_BODY};
use crate::link::BlobRequester;

pub struct CommandHandler {
    cache: Arc<GlyphCache<DirStorage>>,
}

impl CommandHandler {
    pub fn new(cache: Arc<GlyphCache<DirStorage>>) -> Self {
        Self { cache }
    }

    pub fn handle(&self, frame: Frame, link: &mut impl BlobRequester) -> Frame {
        match frame {
            Frame::Download { key, payload } => self.handle_download(key, &payload, link),
            Frame::Lookup(key) => self.handle_lookup(key, link),
            Frame::Stats => self.handle_stats(),
            Frame::Reset => self.handle_reset(),
            other => Frame::Error(format!("unexpected frame from peer: {}", op_name(&other))),
        }
    }

    /// Intake path: a glyph arrived from the peer
    fn handle_download(&self, key: u16, payload: &[u8], link: &mut impl BlobRequester) -> Frame {
        let key = match Key::new(key) {
            Ok(key) => key,
            Err(e) => return Frame::Error(e.to_string()),
        };

        match self.cache.put(key, payload) {
            Ok(size) => {
                link.blob_received(key);
                debug!(%key, bytes = payload.len(), size, "glyph stored");
                // Capacity is validated to fit the key space, so size fits a u16
                Frame::Stored(u16::try_from(size).unwrap_or(u16::MAX))
            }
            Err(e) => {
                warn!(%key, error = %e, "failed to store glyph");
                Frame::Error(e.to_string())
            }
        }
    }

    /// Read path: serve from cache or ask the peer for it
    fn handle_lookup(&self, key: u16, link: &mut impl BlobRequester) -> Frame {
        let key = match Key::new(key) {
            Ok(key) => key,
            Err(e) => return Frame::Error(e.to_string()),
        };

        let mut record = match self.cache.open_entry(key) {
            Ok(record) => record,
            Err(Error::NotFound) => {
                if link.request_blob(key) {
                    debug!(%key, "glyph missing, requested from peer");
                }
                return Frame::Missing(key.get());
            }
            Err(e) => return Frame::Error(e.to_string()),
        };

        let payload = match record.read_to_end() {
            Ok(payload) => payload,
            Err(e) => return Frame::Error(e.to_string()),
        };
        if let Err(e) = record.close() {
            return Frame::Error(e.to_string());
        }

        if payload.len() + 2 > MAX_BODY {
            return Frame::Error(format!("glyph {} too large to send: {} bytes", key, payload.len()));
        }
        Frame::Glyph {
            key: key.get(),
            payload,
        }
    }

    fn handle_stats(&self) -> Frame {
        let report = json!({
            "size": self.cache.len(),
            "capacity": self.cache.capacity(),
            "stats": self.cache.stats().snapshot(),
        });
        Frame::StatsReport(report.to_string())
    }

    fn handle_reset(&self) -> Frame {
        match self.cache.reset() {
            Ok(()) => Frame::Ok,
            Err(e) => Frame::Error(e.to_string()),
        }
    }
}

fn op_name(frame: &Frame) -> &'static str {
    match frame {
        Frame::Request(_) => "REQUEST",
        Frame::Download { .. } => "DOWNLOAD",
        Frame::Lookup(_) => "LOOKUP",
        Frame::Stats => "STATS",
        Frame::Reset => "RESET",
        Frame::Stored(_) => "STORED",
        Frame::Glyph { .. } => "GLYPH",
        Frame::Missing(_) => "MISSING",
        Frame::StatsReport(_) => "STATS_REPORT",
        Frame::Ok => "OK",
        Frame::Error(_) => "ERROR",
    }
}
