//! # glyphstore
//!
//! Named-record storage for a persistent glyph cache.
//!
//! ## Layout
//! - One directory of small named records
//! - Payload records named by decimal key (`"20013"`)
//! - Link records for the recency ring beside them (`"20013.lnk"`)
//! - Nothing is cached in RAM beyond a single call

#![warn(missing_docs)]

mod entry;
mod error;
mod key;
mod memory;
mod parser;
mod storage;

pub use entry::EntryStore;
pub use error::{Error, Result};
pub use key::Key;
pub use memory::{MemRecord, MemStorage};
pub use parser::{
    encode_key, link_name, parse_link_record, parse_record_name, payload_name, LinkRecord,
    RecordName, LINK_RECORD_LEN, NEXT_OFFSET, PREV_OFFSET,
};
pub use storage::{DirStorage, FileRecord, OpenMode, Record, Storage};
