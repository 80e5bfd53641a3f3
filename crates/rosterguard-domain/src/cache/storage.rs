//! Key/value medium behind the permission cache.

use crate::error::StorageError;

/// Per-tab string key/value store.
///
/// Scoped to the browsing session: not shared across devices and not meant
/// for long-term storage. Every operation may fail (storage disabled,
/// quota exceeded); callers in this crate treat failures as an empty store.
///
/// The trait is synchronous so a cache hit can be served without an await
/// point at startup.
pub trait TabStorage: Send + Sync {
    /// Reads the value stored under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Lists all keys currently stored.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}
