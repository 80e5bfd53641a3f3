//! Moka-backed tab storage.

use std::time::Duration;

use moka::sync::Cache;
use tracing::debug;

use rosterguard_domain::{StorageError, TabStorage};

/// Configuration for [`MokaTabStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabStorageConfig {
    /// Maximum number of keys held (default: 10,000).
    pub max_entries: u64,
    /// Keys untouched for this long are dropped. `None` disables idling.
    pub idle_timeout: Option<Duration>,
    /// Writes larger than this are refused with `QuotaExceeded`.
    pub max_value_bytes: usize,
}

impl Default for TabStorageConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            idle_timeout: Some(Duration::from_secs(30 * 60)),
            max_value_bytes: 64 * 1024,
        }
    }
}

impl TabStorageConfig {
    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_max_value_bytes(mut self, bytes: usize) -> Self {
        self.max_value_bytes = bytes;
        self
    }
}

/// Session-scoped string storage on top of a moka cache.
///
/// Mirrors the quota behavior of browser session storage: oversized writes
/// fail instead of evicting other keys.
#[derive(Clone)]
pub struct MokaTabStorage {
    entries: Cache<String, String>,
    max_value_bytes: usize,
}

impl std::fmt::Debug for MokaTabStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaTabStorage")
            .field("entry_count", &self.entries.entry_count())
            .field("max_value_bytes", &self.max_value_bytes)
            .finish()
    }
}

impl Default for MokaTabStorage {
    fn default() -> Self {
        Self::new(TabStorageConfig::default())
    }
}

impl MokaTabStorage {
    pub fn new(config: TabStorageConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_entries);
        if let Some(idle) = config.idle_timeout {
            builder = builder.time_to_idle(idle);
        }
        Self {
            entries: builder.build(),
            max_value_bytes: config.max_value_bytes,
        }
    }

    /// Runs moka's pending maintenance so counts reflect recent writes.
    pub fn sync(&self) {
        self.entries.run_pending_tasks();
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl TabStorage for MokaTabStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(&key.to_string()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let bytes = key.len() + value.len();
        if bytes > self.max_value_bytes {
            debug!(key, bytes, limit = self.max_value_bytes, "tab storage write refused");
            return Err(StorageError::QuotaExceeded { bytes });
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.entries.invalidate(&key.to_string());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let storage = MokaTabStorage::default();
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));

        storage.remove_item("k").unwrap();
        assert!(storage.get_item("k").unwrap().is_none());
    }

    #[test]
    fn test_oversized_write_is_refused() {
        let storage = MokaTabStorage::new(TabStorageConfig::default().with_max_value_bytes(8));

        let err = storage.set_item("key", "0123456789").unwrap_err();
        assert_eq!(err, StorageError::QuotaExceeded { bytes: 13 });
        assert!(storage.get_item("key").unwrap().is_none());
    }

    #[test]
    fn test_keys_lists_all_entries() {
        let storage = MokaTabStorage::default();
        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "2").unwrap();

        let mut keys = storage.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let storage = MokaTabStorage::new(
            TabStorageConfig::default()
                .with_max_entries(10)
                .with_idle_timeout(None),
        );
        for i in 0..100 {
            storage.set_item(&format!("key-{i}"), "v").unwrap();
        }
        storage.sync();
        assert!(storage.entry_count() <= 10);
    }

    #[test]
    fn test_works_as_permission_cache_medium() {
        use std::sync::Arc;

        use rosterguard_domain::model::StampSource;
        use rosterguard_domain::{Clock, PermissionCache, PermissionCacheConfig, SystemClock};

        let storage = Arc::new(MokaTabStorage::default());
        let stamps = Arc::new(StampSource::new(Arc::new(SystemClock) as Arc<dyn Clock>));
        let cache = PermissionCache::new(storage.clone(), stamps, PermissionCacheConfig::default());

        assert!(cache.get("alice@example.org").is_none());
        cache.invalidate_all();
        assert!(storage.keys().unwrap().is_empty());
    }
}
