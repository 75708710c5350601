//! Page cache configuration.

use std::num::NonZeroUsize;

use super::ttl::{DEFAULT_CONTENT_TTL, MAX_TTL_CEILING, TtlConfig};

const DEFAULT_NAMESPACE: &str = "trellis-page";
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Serve and store anonymous page responses through the cache.
    pub enabled: bool,
    /// Prefix of every key and of the epoch counter.
    pub namespace: String,
    /// Default content lifetime in seconds.
    pub default_ttl: u64,
    /// Global lifetime ceiling in seconds.
    pub max_ttl: u64,
    /// Maximum entries held by the in-memory store.
    pub capacity: usize,
    /// Include the site timezone in cache keys.
    pub timezone_aware: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl: DEFAULT_CONTENT_TTL,
            max_ttl: MAX_TTL_CEILING,
            capacity: DEFAULT_CAPACITY,
            timezone_aware: false,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            namespace: settings.namespace.clone(),
            default_ttl: settings.default_ttl_secs,
            max_ttl: settings.max_ttl_secs,
            capacity: settings.capacity.get(),
            timezone_aware: settings.timezone_aware,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> TtlConfig {
        TtlConfig {
            default_ttl: self.default_ttl,
            max_ttl: self.max_ttl,
        }
    }

    /// Store capacity as `NonZeroUsize`, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
