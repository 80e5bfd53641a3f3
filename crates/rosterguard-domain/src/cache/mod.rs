//! Permission caching with TTL over a fallible per-tab store.
//!
//! The cache is a latency optimization, never a correctness dependency:
//! every storage failure is logged and the cache behaves as if it were
//! empty.
//!
//! # Entry usability
//!
//! An entry is usable without revalidation only while it is younger than the
//! configured TTL (5 minutes by default) **and** its key equals the email of
//! the live principal. Stale or mismatched entries are misses.
//!
//! # Write ordering
//!
//! Writes are applied in [`ResolutionStamp`] order: `set` refuses to replace
//! an entry that holds a newer record, and `invalidate` plants a barrier
//! stamp so a resolution that started before the invalidation cannot bring
//! the entry back.
//!
//! # Example
//!
//! ```rust,ignore
//! use rosterguard_domain::cache::{PermissionCache, PermissionCacheConfig};
//!
//! let cache = PermissionCache::new(storage, stamps, PermissionCacheConfig::default());
//! if let Some(entry) = cache.get_for("alice@example.org", principal.email()) {
//!     println!("cached role: {}", entry.record.role());
//! }
//! ```

mod storage;

pub use storage::TabStorage;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{normalize_email, AuthorizationRecord, ResolutionStamp, StampSource};

/// Configuration for the permission cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCacheConfig {
    /// Maximum age at which an entry may be used without revalidation.
    pub ttl: Duration,
    /// Prefix prepended to every storage key.
    pub key_prefix: String,
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            key_prefix: "rosterguard.permissions.".to_string(),
        }
    }
}

impl PermissionCacheConfig {
    /// Sets the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the storage key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// A cached record as persisted in [`TabStorage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized email the entry belongs to.
    pub key: String,
    /// The cached record.
    pub record: AuthorizationRecord,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }

    /// True when the entry is younger than `ttl` at `now`.
    ///
    /// Entries dated in the future (clock stepped back) are not fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = self.age(now);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age >= chrono::Duration::zero() && age < ttl,
            Err(_) => age >= chrono::Duration::zero(),
        }
    }
}

/// Time-bounded `email → record` cache.
///
/// Thread-safe; the resolver's background tasks and the foreground flows
/// share one instance through an `Arc`.
pub struct PermissionCache {
    storage: Arc<dyn TabStorage>,
    stamps: Arc<StampSource>,
    config: PermissionCacheConfig,
    /// Serializes read-compare-write sequences in `set` and `invalidate`.
    write_lock: Mutex<()>,
    /// Invalidation barriers: records stamped before these are refused.
    barriers: DashMap<String, ResolutionStamp>,
    /// Barrier planted by `invalidate_all`, applying to every email.
    floor: Mutex<Option<ResolutionStamp>>,
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("config", &self.config)
            .field("barriers", &self.barriers.len())
            .finish()
    }
}

impl PermissionCache {
    /// Creates a cache over `storage`.
    pub fn new(
        storage: Arc<dyn TabStorage>,
        stamps: Arc<StampSource>,
        config: PermissionCacheConfig,
    ) -> Self {
        Self {
            storage,
            stamps,
            config,
            write_lock: Mutex::new(()),
            barriers: DashMap::new(),
            floor: Mutex::new(None),
        }
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &PermissionCacheConfig {
        &self.config
    }

    /// Returns the stamp source shared with the resolver.
    pub fn stamps(&self) -> &Arc<StampSource> {
        &self.stamps
    }

    fn storage_key(&self, email: &str) -> String {
        format!("{}{}", self.config.key_prefix, email)
    }

    /// Looks up a usable entry for `email`.
    ///
    /// Returns `None` when the entry is missing, older than the TTL,
    /// keyed to another email, unreadable, or when storage fails.
    ///
    /// # Metrics
    ///
    /// Records hit/miss to `rosterguard_cache_hits_total` and
    /// `rosterguard_cache_misses_total`.
    pub fn get(&self, email: &str) -> Option<CacheEntry> {
        let email = normalize_email(email);
        let result = self.lookup(&email);
        if result.is_some() {
            metrics::counter!("rosterguard_cache_hits_total").increment(1);
        } else {
            metrics::counter!("rosterguard_cache_misses_total").increment(1);
        }
        result
    }

    /// Looks up a usable entry for `email` on behalf of the live principal.
    ///
    /// An entry for any email other than the principal's is a miss.
    pub fn get_for(&self, email: &str, principal_email: &str) -> Option<CacheEntry> {
        if normalize_email(email) != normalize_email(principal_email) {
            debug!(email, principal_email, "cache lookup for non-principal email");
            metrics::counter!("rosterguard_cache_misses_total").increment(1);
            return None;
        }
        self.get(email)
    }

    fn lookup(&self, email: &str) -> Option<CacheEntry> {
        let key = self.storage_key(email);
        let raw = match self.storage.get_item(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                warn!(email, %error, "permission cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(email, %error, "discarding unreadable permission cache entry");
                if let Err(error) = self.storage.remove_item(&key) {
                    warn!(email, %error, "failed to discard unreadable cache entry");
                }
                return None;
            }
        };

        if entry.key != email || entry.record.email() != email {
            debug!(email, entry_key = %entry.key, "cache entry keyed to another email");
            return None;
        }

        let now = self.stamps.clock().now();
        if !entry.is_fresh(now, self.config.ttl) {
            debug!(
                email,
                age_secs = entry.age(now).num_seconds(),
                "cache entry expired"
            );
            return None;
        }

        debug!(email, role = %entry.record.role(), "permission cache hit");
        Some(entry)
    }

    /// Stores `record` under `email`.
    ///
    /// Returns `false` when the write was refused: the record is degraded,
    /// belongs to another email, is older than the stored record or than the
    /// last invalidation, or storage failed.
    pub fn set(&self, email: &str, record: &AuthorizationRecord) -> bool {
        let email = normalize_email(email);
        if record.is_degraded() {
            debug!(email = %email, "refusing to cache degraded record");
            return false;
        }
        if record.email() != email {
            warn!(email = %email, record_email = record.email(), "refusing to cache record under another email");
            return false;
        }

        let _guard = self.write_lock.lock();

        let barrier = self.barriers.get(&email).map(|barrier| *barrier);
        let floor = *self.floor.lock();
        if let Some(barrier) = barrier.into_iter().chain(floor).max() {
            if record.stamp() < barrier {
                debug!(email = %email, stamp = %record.stamp(), %barrier, "record predates invalidation");
                return false;
            }
        }

        if let Some(existing) = self.read_raw(&email) {
            if !record.supersedes(&existing.record) {
                debug!(
                    email = %email,
                    stamp = %record.stamp(),
                    existing = %existing.record.stamp(),
                    "cache already holds a newer record"
                );
                return false;
            }
        }

        let entry = CacheEntry {
            key: email.clone(),
            record: record.clone(),
            timestamp: self.stamps.clock().now(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(email = %email, %error, "failed to encode permission cache entry");
                return false;
            }
        };

        match self.storage.set_item(&self.storage_key(&email), &raw) {
            Ok(()) => {
                // The stored record now refuses anything older than the barrier.
                self.barriers.remove(&email);
                debug!(email = %email, role = %record.role(), stamp = %record.stamp(), "permission cache updated");
                true
            }
            Err(error) => {
                warn!(email = %email, %error, "permission cache write failed");
                false
            }
        }
    }

    /// Reads the stored entry without TTL checks or metrics.
    fn read_raw(&self, email: &str) -> Option<CacheEntry> {
        let raw = self.storage.get_item(&self.storage_key(email)).ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// Removes the entry for `email` and refuses writes from resolutions
    /// that started before this call.
    pub fn invalidate(&self, email: &str) {
        let email = normalize_email(email);
        let _guard = self.write_lock.lock();
        self.barriers.insert(email.clone(), self.stamps.next());
        if let Err(error) = self.storage.remove_item(&self.storage_key(&email)) {
            warn!(email = %email, %error, "permission cache invalidation failed");
        } else {
            debug!(email = %email, "permission cache entry invalidated");
        }
    }

    #[cfg(test)]
    pub(crate) fn barrier_count(&self) -> usize {
        self.barriers.len()
    }

    /// Removes every entry written by this cache.
    pub fn invalidate_all(&self) {
        let _guard = self.write_lock.lock();
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(error) => {
                warn!(%error, "permission cache could not list keys for invalidation");
                return;
            }
        };

        *self.floor.lock() = Some(self.stamps.next());
        self.barriers.clear();
        let mut removed = 0usize;
        for key in keys {
            if !key.starts_with(&self.config.key_prefix) {
                continue;
            }
            match self.storage.remove_item(&key) {
                Ok(()) => removed += 1,
                Err(error) => warn!(key = %key, %error, "permission cache invalidation failed"),
            }
        }
        debug!(removed, "permission cache cleared");
    }
}

/// Registers permission cache metric descriptions.
///
/// Call once during startup; optional, but gives exporters help text.
pub fn register_permission_cache_metrics() {
    metrics::describe_counter!(
        "rosterguard_cache_hits_total",
        "Total number of permission cache hits"
    );
    metrics::describe_counter!(
        "rosterguard_cache_misses_total",
        "Total number of permission cache misses"
    );
    metrics::describe_counter!(
        "rosterguard_lookup_timeouts_total",
        "Total number of directory lookups that lost the race against their deadline"
    );
    metrics::describe_counter!(
        "rosterguard_revalidations_total",
        "Total number of background permission revalidations started"
    );
}
