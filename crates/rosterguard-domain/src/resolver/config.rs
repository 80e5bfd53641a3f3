//! Configuration for the permission resolver.

use std::time::Duration;

/// Configuration for the permission resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Deadline for each directory lookup. When it fires the lookup is
    /// treated as "not found" for now; the call itself keeps running.
    pub lookup_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

impl ResolverConfig {
    /// Creates a new configuration with the specified lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }
}
