//! Key/value store contract and the bundled in-memory implementation.
//!
//! The response cache only needs three primitives: `get`, `set` with a
//! store-native expiry and an atomic `incr` used by the version counter.
//! Anything offering those (an external cache server, a shared map) can back
//! the page cache.
//!
//! [`MemoryStore`] keeps counters apart from the bounded entries: a key
//! written through `incr` is never evicted and never expires until a plain
//! `set` replaces it.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;

use super::error::CacheError;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store `value`, expiring after `ttl_seconds`; `0` stores without expiry.
    async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64) -> Result<(), CacheError>;

    /// Atomically increment the decimal counter under `key` and return the
    /// new value. A missing key counts as `0`.
    async fn incr(&self, key: &str) -> Result<u64, CacheError>;
}

pub(crate) fn parse_counter(key: &str, bytes: &[u8]) -> Result<u64, CacheError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.trim().parse::<u64>().ok())
        .ok_or_else(|| CacheError::NotACounter {
            key: key.to_string(),
        })
}

pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

#[derive(Clone)]
struct StoredValue {
    bytes: Bytes,
    expires_at: Option<OffsetDateTime>,
}

impl StoredValue {
    fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Bounded in-process store with lazy expiry and LRU eviction.
pub struct MemoryStore {
    counters: Mutex<HashMap<String, u64>>,
    entries: Mutex<LruCache<String, StoredValue>>,
    clock: Clock,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self::with_clock(capacity, Arc::new(OffsetDateTime::now_utc))
    }

    pub fn with_clock(capacity: NonZeroUsize, clock: Clock) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            entries: Mutex::new(LruCache::new(capacity)),
            clock,
        }
    }

    /// Number of physically held entries, including ones that are logically stale.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether bytes are physically present under `key`, ignoring expiry.
    pub fn contains_raw(&self, key: &str) -> bool {
        mutex_lock(&self.counters, SOURCE, "contains_raw").contains_key(key)
            || mutex_lock(&self.entries, SOURCE, "contains_raw").contains(key)
    }

    fn now(&self) -> OffsetDateTime {
        (self.clock)()
    }

    fn put_value(&self, key: &str, value: StoredValue, op: &'static str) {
        let evicted = mutex_lock(&self.entries, SOURCE, op).push(key.to_string(), value);
        if evicted.is_some_and(|(evicted_key, _)| evicted_key != key) {
            counter!("trellis_page_cache_evict_total").increment(1);
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        if let Some(count) = mutex_lock(&self.counters, SOURCE, "get").get(key) {
            return Ok(Some(Bytes::from(count.to_string())));
        }
        let now = self.now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        match entries.get(key) {
            None => return Ok(None),
            Some(value) if !value.is_expired(now) => return Ok(Some(value.bytes.clone())),
            Some(_) => {}
        }
        entries.pop(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64) -> Result<(), CacheError> {
        let expires_at = if ttl_seconds == 0 {
            None
        } else {
            let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
            self.now().checked_add(time::Duration::seconds(ttl))
        };
        // Lock order: counters, then entries.
        let mut counters = mutex_lock(&self.counters, SOURCE, "set");
        counters.remove(key);
        self.put_value(
            key,
            StoredValue {
                bytes: value,
                expires_at,
            },
            "set",
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64, CacheError> {
        let now = self.now();
        let mut counters = mutex_lock(&self.counters, SOURCE, "incr");
        if let Some(count) = counters.get_mut(key) {
            *count = count.saturating_add(1);
            return Ok(*count);
        }

        // First increment moves any plain value into the counter map.
        let mut entries = mutex_lock(&self.entries, SOURCE, "incr");
        let current = match entries.peek(key) {
            Some(value) if !value.is_expired(now) => parse_counter(key, &value.bytes)?,
            _ => 0,
        };
        entries.pop(key);
        let next = current.saturating_add(1);
        counters.insert(key.to_string(), next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    fn manual_clock() -> (Arc<AtomicI64>, Clock) {
        let now = Arc::new(AtomicI64::new(1_700_000_000));
        let handle = now.clone();
        let clock: Clock = Arc::new(move || {
            OffsetDateTime::from_unix_timestamp(handle.load(Ordering::SeqCst))
                .expect("valid timestamp")
        });
        (now, clock)
    }

    fn capacity(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).expect("non-zero capacity")
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let store = MemoryStore::new(capacity(8));
        store
            .set("k", Bytes::from_static(b"value"), 60)
            .await
            .expect("set");
        let value = store.get("k").await.expect("get");
        assert_eq!(value, Some(Bytes::from_static(b"value")));
        assert!(store.get("missing").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn entries_expire_lazily() {
        let (now, clock) = manual_clock();
        let store = MemoryStore::with_clock(capacity(8), clock);
        store
            .set("k", Bytes::from_static(b"value"), 30)
            .await
            .expect("set");

        now.fetch_add(29, Ordering::SeqCst);
        assert!(store.get("k").await.expect("get").is_some());

        now.fetch_add(1, Ordering::SeqCst);
        assert!(store.get("k").await.expect("get").is_none());
        assert!(!store.contains_raw("k"));
    }

    #[tokio::test]
    async fn zero_ttl_never_expires() {
        let (now, clock) = manual_clock();
        let store = MemoryStore::with_clock(capacity(8), clock);
        store
            .set("k", Bytes::from_static(b"1"), 0)
            .await
            .expect("set");
        now.fetch_add(10 * 365 * 24 * 3600, Ordering::SeqCst);
        assert!(store.get("k").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn incr_counts_from_zero() {
        let store = MemoryStore::new(capacity(8));
        assert_eq!(store.incr("counter").await.expect("incr"), 1);
        assert_eq!(store.incr("counter").await.expect("incr"), 2);

        store
            .set("counter", Bytes::from_static(b"41"), 0)
            .await
            .expect("set");
        assert_eq!(store.incr("counter").await.expect("incr"), 42);
    }

    #[tokio::test]
    async fn incr_rejects_non_counter_values() {
        let store = MemoryStore::new(capacity(8));
        store
            .set("k", Bytes::from_static(b"not a number"), 0)
            .await
            .expect("set");
        let err = store.incr("k").await.expect_err("non-counter rejected");
        assert!(matches!(err, CacheError::NotACounter { key } if key == "k"));
    }

    #[tokio::test]
    async fn counters_survive_eviction() {
        let store = MemoryStore::new(capacity(1));
        store.incr("pages:version").await.expect("incr");
        for key in ["a", "b", "c"] {
            store
                .set(key, Bytes::from_static(b"x"), 0)
                .await
                .expect("set");
        }
        assert_eq!(
            store.get("pages:version").await.expect("get"),
            Some(Bytes::from_static(b"1"))
        );
        assert_eq!(store.incr("pages:version").await.expect("incr"), 2);
        assert!(store.contains_raw("c"));
    }

    #[tokio::test]
    async fn set_replaces_a_counter() {
        let store = MemoryStore::new(capacity(4));
        store.incr("k").await.expect("incr");
        store
            .set("k", Bytes::from_static(b"plain"), 0)
            .await
            .expect("set");
        assert_eq!(
            store.get("k").await.expect("get"),
            Some(Bytes::from_static(b"plain"))
        );
    }

    #[tokio::test]
    async fn lru_eviction_respects_capacity() {
        let store = MemoryStore::new(capacity(2));
        for key in ["a", "b", "c"] {
            store
                .set(key, Bytes::from_static(b"x"), 0)
                .await
                .expect("set");
        }
        assert_eq!(store.len(), 2);
        assert!(!store.contains_raw("a"));
        assert!(store.contains_raw("c"));
    }

    #[tokio::test]
    async fn store_recovers_from_poisoned_lock() {
        let store = MemoryStore::new(capacity(2));

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.lock().expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store
            .set("k", Bytes::from_static(b"v"), 0)
            .await
            .expect("set after poison");
        assert!(store.get("k").await.expect("get").is_some());
    }
}
