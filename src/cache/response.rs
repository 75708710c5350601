//! Versioned response cache.
//!
//! Entries are stored under `(key, epoch)` and carry the epoch they were
//! written with. A read only accepts an entry whose embedded epoch matches the
//! epoch read from the version store at that moment, never a value captured
//! earlier in the request.
//!
//! Store failures never escape: reads degrade to a miss and writes are
//! skipped, both logged and counted.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use metrics::counter;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::error::CacheError;
use super::store::{Clock, KeyValueStore};
use super::version::VersionStore;

const SOURCE: &str = "cache::response";

/// A cached page as handed back to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub body: Bytes,
    pub headers: Vec<(String, String)>,
    pub expires_at: OffsetDateTime,
}

impl CachedPage {
    /// Whole seconds left before expiry, rounded to the nearest second.
    pub fn remaining_seconds(&self, now: OffsetDateTime) -> u64 {
        let remaining = (self.expires_at - now).as_seconds_f64();
        if remaining <= 0.0 {
            0
        } else {
            (remaining + 0.5) as u64
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    epoch: u64,
    body: String,
    headers: Vec<(String, String)>,
    expires_at: i64,
}

#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    versions: VersionStore,
    namespace: String,
    clock: Clock,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        let versions = VersionStore::new(store.clone());
        Self::with_versions(store, versions, namespace)
    }

    pub fn with_versions(
        store: Arc<dyn KeyValueStore>,
        versions: VersionStore,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            versions,
            namespace: namespace.into(),
            clock: Arc::new(OffsetDateTime::now_utc),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn now(&self) -> OffsetDateTime {
        (self.clock)()
    }

    fn entry_key(key: &str, epoch: u64) -> String {
        format!("{key}@v{epoch}")
    }

    /// Read the entry for `key` under the current epoch.
    pub async fn get(&self, key: &str) -> Option<CachedPage> {
        match self.try_get(key).await {
            Ok(Some(page)) => {
                counter!("trellis_page_cache_hit_total").increment(1);
                debug!(cache = "page", outcome = "hit", key, "serving cached response");
                Some(page)
            }
            Ok(None) => {
                counter!("trellis_page_cache_miss_total").increment(1);
                debug!(cache = "page", outcome = "miss", key, "cache miss");
                None
            }
            Err(err) => {
                counter!("trellis_page_cache_store_error_total").increment(1);
                warn!(
                    target_module = SOURCE,
                    op = "get",
                    key,
                    error = %err,
                    "Cache read failed; treating as miss"
                );
                None
            }
        }
    }

    async fn try_get(&self, key: &str) -> Result<Option<CachedPage>, CacheError> {
        let epoch = self.versions.get_version(&self.namespace).await?;
        let Some(bytes) = self.store.get(&Self::entry_key(key, epoch)).await? else {
            return Ok(None);
        };

        let entry: StoredEntry = serde_json::from_slice(&bytes)?;
        if entry.epoch != epoch {
            debug!(key, entry_epoch = entry.epoch, epoch, "discarding stale cache entry");
            return Ok(None);
        }

        let Ok(expires_at) = OffsetDateTime::from_unix_timestamp(entry.expires_at) else {
            return Ok(None);
        };
        if expires_at <= self.now() {
            return Ok(None);
        }

        let body = match STANDARD.decode(entry.body.as_bytes()) {
            Ok(body) => Bytes::from(body),
            Err(err) => {
                warn!(key, error = %err, "Cached body is not valid base64; ignoring entry");
                return Ok(None);
            }
        };

        Ok(Some(CachedPage {
            body,
            headers: entry.headers,
            expires_at,
        }))
    }

    /// Write `body` under the current epoch; a zero TTL skips the write.
    pub async fn put(
        &self,
        key: &str,
        body: Bytes,
        headers: Vec<(String, String)>,
        ttl_seconds: u64,
    ) {
        if ttl_seconds == 0 {
            return;
        }
        match self.try_put(key, &body, headers, ttl_seconds).await {
            Ok(()) => {
                counter!("trellis_page_cache_write_total").increment(1);
                debug!(cache = "page", key, ttl_seconds, "cached response");
            }
            Err(err) => {
                counter!("trellis_page_cache_store_error_total").increment(1);
                warn!(
                    target_module = SOURCE,
                    op = "put",
                    key,
                    error = %err,
                    "Cache write failed; response served uncached"
                );
            }
        }
    }

    async fn try_put(
        &self,
        key: &str,
        body: &Bytes,
        headers: Vec<(String, String)>,
        ttl_seconds: u64,
    ) -> Result<(), CacheError> {
        let epoch = self.versions.get_version(&self.namespace).await?;
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        let expires_at = self.now().unix_timestamp().saturating_add(ttl);
        let entry = StoredEntry {
            epoch,
            body: STANDARD.encode(body),
            headers,
            expires_at,
        };
        let encoded = serde_json::to_vec(&entry)?;
        self.store
            .set(&Self::entry_key(key, epoch), Bytes::from(encoded), ttl_seconds)
            .await
    }

    /// Orphan every entry of this namespace by bumping its epoch.
    pub async fn invalidate_all(&self) -> Option<u64> {
        match self.versions.bump(&self.namespace).await {
            Ok(version) => Some(version),
            Err(err) => {
                counter!("trellis_page_cache_store_error_total").increment(1);
                warn!(
                    target_module = SOURCE,
                    op = "invalidate_all",
                    namespace = %self.namespace,
                    error = %err,
                    "Cache epoch bump failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::store::MemoryStore;

    fn memory() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(NonZeroUsize::new(64).expect("non-zero")))
    }

    fn headers() -> Vec<(String, String)> {
        vec![("content-type".to_string(), "text/html".to_string())]
    }

    #[tokio::test]
    async fn put_then_get_returns_the_entry() {
        let cache = ResponseCache::new(memory(), "pages");
        cache
            .put("k", Bytes::from_static(b"<p>hi</p>"), headers(), 60)
            .await;

        let page = cache.get("k").await.expect("cached page");
        assert_eq!(page.body, Bytes::from_static(b"<p>hi</p>"));
        assert_eq!(page.headers, headers());
    }

    #[tokio::test]
    async fn zero_ttl_is_a_no_op() {
        let store = memory();
        let cache = ResponseCache::new(store.clone(), "pages");
        cache.put("k", Bytes::from_static(b"x"), headers(), 0).await;
        assert!(cache.get("k").await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn bump_orphans_entries_without_deleting_them() {
        let store = memory();
        let cache = ResponseCache::new(store.clone(), "pages");
        cache.put("k", Bytes::from_static(b"x"), headers(), 60).await;
        assert!(store.contains_raw("k@v1"));

        assert_eq!(cache.invalidate_all().await, Some(2));
        assert!(cache.get("k").await.is_none());
        assert!(store.contains_raw("k@v1"));
    }

    #[tokio::test]
    async fn entry_with_foreign_epoch_is_ignored() {
        let store = memory();
        let cache = ResponseCache::new(store.clone(), "pages");
        let forged = serde_json::to_vec(&StoredEntry {
            epoch: 7,
            body: STANDARD.encode(b"stale"),
            headers: Vec::new(),
            expires_at: OffsetDateTime::now_utc().unix_timestamp() + 60,
        })
        .expect("encode");
        store
            .set("k@v1", Bytes::from(forged), 60)
            .await
            .expect("set");

        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_even_if_store_keeps_it() {
        let now = Arc::new(AtomicI64::new(1_700_000_000));
        let handle = now.clone();
        let clock: Clock = Arc::new(move || {
            OffsetDateTime::from_unix_timestamp(handle.load(Ordering::SeqCst)).expect("timestamp")
        });
        let cache = ResponseCache::new(memory(), "pages").with_clock(clock);

        cache.put("k", Bytes::from_static(b"x"), headers(), 30).await;
        let page = cache.get("k").await.expect("fresh entry");
        assert_eq!(page.remaining_seconds(cache.now()), 30);

        now.fetch_add(30, Ordering::SeqCst);
        assert!(cache.get("k").await.is_none());
    }

    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CacheError::unavailable("connection refused"));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Bytes, ttl: u64) -> Result<(), CacheError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CacheError::unavailable("connection refused"));
            }
            self.inner.set(key, value, ttl).await
        }

        async fn incr(&self, key: &str) -> Result<u64, CacheError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CacheError::unavailable("connection refused"));
            }
            self.inner.incr(key).await
        }
    }

    #[tokio::test]
    async fn store_failures_degrade_to_miss_and_skip() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(NonZeroUsize::new(8).expect("non-zero")),
            failing: AtomicBool::new(false),
        });
        let cache = ResponseCache::new(store.clone(), "pages");
        cache.put("k", Bytes::from_static(b"x"), headers(), 60).await;

        store.failing.store(true, Ordering::SeqCst);
        assert!(cache.get("k").await.is_none());
        cache.put("other", Bytes::from_static(b"y"), headers(), 60).await;
        assert_eq!(cache.invalidate_all().await, None);

        store.failing.store(false, Ordering::SeqCst);
        assert!(cache.get("k").await.is_some());
        assert!(cache.get("other").await.is_none());
    }
}
