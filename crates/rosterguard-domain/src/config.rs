//! Aggregate configuration for the authorization core.

use std::time::Duration;

use crate::cache::PermissionCacheConfig;
use crate::resolver::ResolverConfig;

/// Configuration for the whole authorization core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Permission cache settings.
    pub cache: PermissionCacheConfig,
    /// Directory lookup settings.
    pub resolver: ResolverConfig,
    /// Overall deadline after which the loading gate is released even if
    /// permissions are still resolving.
    pub loading_deadline: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cache: PermissionCacheConfig::default(),
            resolver: ResolverConfig::default(),
            loading_deadline: Duration::from_secs(3),
        }
    }
}

impl AuthConfig {
    pub fn with_cache(mut self, cache: PermissionCacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_loading_deadline(mut self, deadline: Duration) -> Self {
        self.loading_deadline = deadline;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.resolver.lookup_timeout, Duration::from_secs(5));
        assert_eq!(config.loading_deadline, Duration::from_secs(3));
    }

    #[test]
    fn test_builders() {
        let config = AuthConfig::default()
            .with_loading_deadline(Duration::from_millis(500))
            .with_resolver(ResolverConfig::default().with_lookup_timeout(Duration::from_secs(1)));
        assert_eq!(config.loading_deadline, Duration::from_millis(500));
        assert_eq!(config.resolver.lookup_timeout, Duration::from_secs(1));
    }
}
