//! Cache configuration

use glyphstore::{Error, Result};

/// Default maximum number of cached glyphs
pub const DEFAULT_CAPACITY: usize = 250;

/// Largest capacity the 16-bit key space can hold (sentinels excluded)
pub const MAX_CAPACITY: usize = u16::MAX as usize - 1;

/// Settings fixed when a [`GlyphCache`](crate::GlyphCache) is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of real entries
    pub capacity: usize,

    /// Wipe the cache directory on open instead of recovering it
    pub cold_start: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            cold_start: true,
        }
    }
}

impl CacheConfig {
    /// Cold-start configuration with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Choose between wiping and recovering existing entries on open
    pub fn with_cold_start(mut self, cold_start: bool) -> Self {
        self.cold_start = cold_start;
        self
    }

    /// Reject capacities outside `1..=MAX_CAPACITY`
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig("capacity must be at least 1".to_string()));
        }
        if self.capacity > MAX_CAPACITY {
            return Err(Error::InvalidConfig(format!(
                "capacity {} exceeds the key space ({})",
                self.capacity, MAX_CAPACITY
            )));
        }
        Ok(())
    }
}
