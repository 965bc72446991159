//! Key/value persistence port.
//!
//! The catalog cache only needs a flat string store, the shape mobile
//! platforms expose (AsyncStorage, SharedPreferences, NSUserDefaults).
//! [`KeyValueStore`] abstracts it so the cache can run against a directory
//! on disk ([`FileStore`]) or in memory ([`MemoryStore`]).
//!
//! Backends report failures as [`StorageError`]. Whether a failure means
//! "out of space" is decided in exactly one place, [`is_storage_full`],
//! because platforms disagree on how they signal it.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

/// Substrings backends use to report an exhausted store.
const STORAGE_FULL_MARKERS: &[&str] = &[
    "SQLITE_FULL",
    "database or disk is full",
    "No space left on device",
    "QuotaExceeded",
    "quota exceeded",
];

/// `ENOSPC` on Linux, macOS and Android.
const ENOSPC: i32 = 28;

/// Errors reported by a [`KeyValueStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The store rejected a write because it is out of space
    #[error("Storage full: {0}")]
    Full(String),

    /// File I/O failure other than running out of space
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// Any other backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Build an error from a backend message, classifying out-of-space.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_storage_full(&message, None) {
            Self::Full(message)
        } else {
            Self::Backend(message)
        }
    }

    /// Whether this error means the store is out of space.
    pub fn is_storage_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        let message = err.to_string();
        if is_storage_full(&message, err.raw_os_error()) {
            Self::Full(message)
        } else {
            Self::Io(message)
        }
    }
}

/// Decide whether a backend failure means the store is out of space.
///
/// Prefers the OS error code when there is one; otherwise falls back to
/// matching the known messages of SQLite-backed and quota-limited stores.
pub fn is_storage_full(message: &str, os_code: Option<i32>) -> bool {
    if os_code == Some(ENOSPC) {
        return true;
    }
    STORAGE_FULL_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Flat string key/value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Remove several keys.
    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }

    /// Remove every key.
    async fn clear(&self) -> Result<(), StorageError>;
}
