//! Cache keys and the two reserved ring sentinels

use std::fmt;

use crate::error::{Error, Result};

/// A 16-bit cache key, typically a glyph codepoint.
///
/// `0x0000` and `0xFFFF` are reserved for the recency ring's `HEAD` and
/// `TAIL` anchors. Every other value is a real key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(u16);

impl Key {
    /// Most-recent anchor of the recency ring
    pub const HEAD: Key = Key(0x0000);

    /// Least-recent anchor of the recency ring
    pub const TAIL: Key = Key(0xFFFF);

    /// Wrap any raw value, sentinels included
    pub const fn from_raw(raw: u16) -> Self {
        Key(raw)
    }

    /// Wrap a raw value that must name a real entry
    pub fn new(raw: u16) -> Result<Self> {
        let key = Key(raw);
        if key.is_sentinel() {
            return Err(Error::ReservedKey(raw));
        }
        Ok(key)
    }

    /// Raw 16-bit value
    pub const fn get(self) -> u16 {
        self.0
    }

    /// True for `HEAD` and `TAIL`
    pub const fn is_sentinel(self) -> bool {
        self.0 == Self::HEAD.0 || self.0 == Self::TAIL.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Key::HEAD => write!(f, "HEAD"),
            Key::TAIL => write!(f, "TAIL"),
            Key(raw) => write!(f, "{}", raw),
        }
    }
}

impl TryFrom<u16> for Key {
    type Error = Error;

    fn try_from(raw: u16) -> Result<Self> {
        Key::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_rejected() {
        assert!(matches!(Key::new(0), Err(Error::ReservedKey(0))));
        assert!(matches!(Key::new(0xFFFF), Err(Error::ReservedKey(0xFFFF))));
        assert_eq!(Key::new(1).unwrap().get(), 1);
        assert_eq!(Key::new(0xFFFE).unwrap().get(), 0xFFFE);
    }

    #[test]
    fn test_display() {
        assert_eq!(Key::HEAD.to_string(), "HEAD");
        assert_eq!(Key::TAIL.to_string(), "TAIL");
        assert_eq!(Key::from_raw(0x4E2D).to_string(), "20013");
    }
}
