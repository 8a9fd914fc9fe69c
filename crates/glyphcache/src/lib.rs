//! # glyphcache
//!
//! Bounded LRU cache of glyph payloads whose recency order lives in storage.
//!
//! ## Architecture
//! - **EntryStore**: one payload record per key (from `glyphstore`)
//! - **RecencyIndex**: circular doubly-linked list of 4-byte link records,
//!   anchored by `HEAD` (0x0000) and `TAIL` (0xFFFF)
//! - **GlyphCache**: capacity policy, evicts from `TAIL.prev`
//!
//! No index is kept in RAM; every operation touches a handful of records.

#![warn(missing_docs)]

mod cache;
mod config;
mod recency;
mod stats;

pub use cache::GlyphCache;
pub use config::{CacheConfig, DEFAULT_CAPACITY, MAX_CAPACITY};
pub use recency::{InvariantError, RecencyIndex};
pub use stats::{CacheStats, StatsSnapshot};

pub use glyphstore::{DirStorage, Error, Key, MemStorage, Record, Result, Storage};
