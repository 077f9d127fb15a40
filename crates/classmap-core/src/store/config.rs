//! Store configuration.

use std::path::PathBuf;

/// Longest identifier accepted by default.
pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 128;

/// Configuration for the table stores.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the database (a directory for sled, a file for SQLite).
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Flush interval in milliseconds. None means flush on commit only.
    pub flush_every_ms: Option<u64>,

    /// Enable zstd compression.
    pub compression: bool,

    /// Temporary database (deleted on drop).
    pub temporary: bool,

    /// Longest table or column name the store accepts.
    pub max_identifier_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./classmap_data"),
            cache_capacity: 64 * 1024 * 1024, // 64MB
            flush_every_ms: Some(1000),
            compression: true,
            temporary: false,
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary in-memory configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the page cache capacity.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Set the flush interval.
    pub fn with_flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }

    /// Enable or disable compression.
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    /// Set the identifier length limit.
    pub fn with_max_identifier_len(mut self, len: usize) -> Self {
        self.max_identifier_len = len;
        self
    }

    /// Convert to sled configuration.
    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression)
            .flush_every_ms(self.flush_every_ms);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = StoreConfig::new("/tmp/classmap")
            .with_cache_capacity(1024)
            .with_flush_every_ms(None)
            .with_compression(false)
            .with_max_identifier_len(30);
        assert_eq!(config.path, PathBuf::from("/tmp/classmap"));
        assert_eq!(config.cache_capacity, 1024);
        assert!(config.flush_every_ms.is_none());
        assert!(!config.compression);
        assert_eq!(config.max_identifier_len, 30);
        assert!(!config.temporary);
    }

    #[test]
    fn test_temporary() {
        let config = StoreConfig::temporary();
        assert!(config.temporary);
        assert!(config.to_sled_config().open().is_ok());
    }
}
