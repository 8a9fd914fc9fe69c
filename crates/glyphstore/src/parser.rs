//! Record codec using nom
//!
//! Link record layout (4 bytes):
//! ```text
//! [2 bytes: prev key u16 little-endian]
//! [2 bytes: next key u16 little-endian]
//! ```
//!
//! Record names inside the cache directory:
//! ```text
//! <decimal key>        payload record, e.g. "20013"
//! <decimal key>.lnk    link record, e.g. "20013.lnk", "0.lnk", "65535.lnk"
//! ```

use nom::{
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{all_consuming, map_res, opt},
    number::complete::le_u16,
    sequence::{pair, tuple},
    IResult,
};

use crate::error::{Error, Result};
use crate::key::Key;

/// Size of an encoded link record
pub const LINK_RECORD_LEN: usize = 4;

/// Byte offset of the `prev` field
pub const PREV_OFFSET: u64 = 0;

/// Byte offset of the `next` field
pub const NEXT_OFFSET: u64 = 2;

/// Suffix that distinguishes link records from payload records
pub const LINK_SUFFIX: &str = ".lnk";

/// Neighbours of a key in recency order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRecord {
    /// Next more-recent key (`HEAD` for the most-recent entry)
    pub prev: Key,
    /// Next less-recent key (`TAIL` for the least-recent entry)
    pub next: Key,
}

impl LinkRecord {
    /// Create a link record
    pub fn new(prev: Key, next: Key) -> Self {
        Self { prev, next }
    }

    /// Encode into the on-storage layout
    pub fn encode(&self) -> [u8; LINK_RECORD_LEN] {
        let prev = self.prev.get().to_le_bytes();
        let next = self.next.get().to_le_bytes();
        [prev[0], prev[1], next[0], next[1]]
    }
}

/// Decode a link record
///
/// Trailing bytes beyond the first four are ignored.
pub fn parse_link_record(input: &[u8]) -> Result<LinkRecord> {
    if input.len() < LINK_RECORD_LEN {
        return Err(Error::Corrupt(format!(
            "link record too short: {} bytes",
            input.len()
        )));
    }

    let parsed: IResult<&[u8], (u16, u16)> = tuple((le_u16, le_u16))(input);
    let (_, (prev, next)) = parsed?;
    Ok(LinkRecord::new(Key::from_raw(prev), Key::from_raw(next)))
}

/// Encode a single key field for a seek-then-write update
pub fn encode_key(key: Key) -> [u8; 2] {
    key.get().to_le_bytes()
}

/// Kind of record a directory entry names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordName {
    /// Payload bytes for a key
    Payload(Key),
    /// Link record for a key
    Link(Key),
}

impl RecordName {
    /// The key this record belongs to
    pub fn key(&self) -> Key {
        match *self {
            RecordName::Payload(key) | RecordName::Link(key) => key,
        }
    }
}

fn record_name(input: &str) -> IResult<&str, RecordName> {
    let (rest, (raw, suffix)) = all_consuming(pair(
        map_res(digit1, |digits: &str| digits.parse::<u16>()),
        opt(tag(LINK_SUFFIX)),
    ))(input)?;

    let key = Key::from_raw(raw);
    let name = match suffix {
        Some(_) => RecordName::Link(key),
        None => RecordName::Payload(key),
    };
    Ok((rest, name))
}

/// Classify a directory entry name, `None` for names the cache does not own
pub fn parse_record_name(name: &str) -> Option<RecordName> {
    record_name(name).ok().map(|(_, parsed)| parsed)
}

/// Name of the payload record for `key`
pub fn payload_name(key: Key) -> String {
    key.get().to_string()
}

/// Name of the link record for `key`
pub fn link_name(key: Key) -> String {
    format!("{}{}", key.get(), LINK_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_record_layout() {
        let record = LinkRecord::new(Key::HEAD, Key::from_raw(0x1234));
        let bytes = record.encode();

        assert_eq!(bytes, [0x00, 0x00, 0x34, 0x12]);
        assert_eq!(parse_link_record(&bytes).unwrap(), record);
    }

    #[test]
    fn test_link_record_too_short() {
        let result = parse_link_record(&[0x01, 0x00, 0x02]);
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_field_offsets_match_encoding() {
        let mut bytes = LinkRecord::new(Key::from_raw(7), Key::from_raw(9)).encode();
        let next = encode_key(Key::TAIL);
        bytes[NEXT_OFFSET as usize..NEXT_OFFSET as usize + 2].copy_from_slice(&next);

        let parsed = parse_link_record(&bytes).unwrap();
        assert_eq!(parsed.prev, Key::from_raw(7));
        assert_eq!(parsed.next, Key::TAIL);
        assert_eq!(PREV_OFFSET, 0);
    }

    #[test]
    fn test_parse_record_names() {
        assert_eq!(
            parse_record_name("20013"),
            Some(RecordName::Payload(Key::from_raw(20013)))
        );
        assert_eq!(parse_record_name("0.lnk"), Some(RecordName::Link(Key::HEAD)));
        assert_eq!(parse_record_name("65535.lnk"), Some(RecordName::Link(Key::TAIL)));
        assert_eq!(
            parse_record_name("65.lnk").map(|name| name.key()),
            Some(Key::from_raw(65))
        );
    }

    #[test]
    fn test_parse_foreign_names() {
        assert_eq!(parse_record_name("notes.txt"), None);
        assert_eq!(parse_record_name("65536"), None);
        assert_eq!(parse_record_name("12.lnk.bak"), None);
        assert_eq!(parse_record_name(""), None);
    }

    #[test]
    fn test_names_round_trip_through_parser() {
        let key = Key::from_raw(321);
        assert_eq!(parse_record_name(&payload_name(key)), Some(RecordName::Payload(key)));
        assert_eq!(parse_record_name(&link_name(key)), Some(RecordName::Link(key)));
    }
}
