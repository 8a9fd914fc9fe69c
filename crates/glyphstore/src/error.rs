//! Error types for glyphstore

use std::fmt;
use std::io;

/// Result type alias for glyphstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage, index and cache operations
#[derive(Debug)]
pub enum Error {
    /// I/O error from the storage backend
    Io(io::Error),

    /// Record does not exist
    NotFound,

    /// Storage exhausted during a write
    OutOfSpace,

    /// Record contents or ring structure could not be decoded
    Corrupt(String),

    /// Sentinel key used where a real key is required
    ReservedKey(u16),

    /// Key is already linked into the recency ring
    AlreadyLinked(u16),

    /// Eviction requested from a ring with no real entries
    CapacityViolation,

    /// Rejected cache configuration
    InvalidConfig(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::NotFound => write!(f, "Record not found"),
            Error::OutOfSpace => write!(f, "Storage out of space"),
            Error::Corrupt(msg) => write!(f, "Corrupt record: {}", msg),
            Error::ReservedKey(key) => write!(f, "Key {:#06x} is a reserved sentinel", key),
            Error::AlreadyLinked(key) => write!(f, "Key {} is already in the recency ring", key),
            Error::CapacityViolation => write!(f, "Eviction requested from an empty ring"),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound,
            io::ErrorKind::StorageFull => Error::OutOfSpace,
            _ => Error::Io(err),
        }
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        Error::Corrupt(format!("{:?}", err))
    }
}

impl Error {
    /// True for `NotFound`, which cleanup paths are allowed to ignore
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}
