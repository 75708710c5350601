//! Per-namespace cache epochs.
//!
//! Every response cache entry is written under the epoch that was current at
//! write time. Bumping the epoch orphans all earlier entries at once; they
//! are never deleted explicitly and age out through the store's own expiry.
//!
//! The stored counter holds the number of bumps, so the epoch is
//! `INITIAL_VERSION + bumps` and a bump is one atomic `incr`.

use std::sync::Arc;

use metrics::counter;
use tracing::info;

use super::error::CacheError;
use super::store::{KeyValueStore, parse_counter};

/// Epoch reported for a namespace that has never been bumped.
pub const INITIAL_VERSION: u64 = 1;

#[derive(Clone)]
pub struct VersionStore {
    store: Arc<dyn KeyValueStore>,
}

impl VersionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn version_key(namespace: &str) -> String {
        format!("{namespace}:version")
    }

    pub async fn get_version(&self, namespace: &str) -> Result<u64, CacheError> {
        let key = Self::version_key(namespace);
        let bumps = match self.store.get(&key).await? {
            Some(bytes) => parse_counter(&key, &bytes)?,
            None => 0,
        };
        Ok(INITIAL_VERSION.saturating_add(bumps))
    }

    /// Increment the namespace epoch and return the new value.
    ///
    /// The first bump of an unset namespace yields 2.
    pub async fn bump(&self, namespace: &str) -> Result<u64, CacheError> {
        let key = Self::version_key(namespace);
        let version = INITIAL_VERSION.saturating_add(self.store.incr(&key).await?);
        counter!("trellis_cache_epoch_bump_total").increment(1);
        info!(namespace, version, "Cache epoch bumped");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Barrier;

    use super::*;
    use crate::cache::store::MemoryStore;

    /// Records every store call and holds concurrent `incr` callers at a
    /// barrier so they race on the same key.
    struct RecordingStore {
        inner: MemoryStore,
        calls: Mutex<Vec<&'static str>>,
        gate: Barrier,
    }

    impl RecordingStore {
        fn new(racers: usize) -> Self {
            Self {
                inner: MemoryStore::new(NonZeroUsize::new(16).expect("non-zero")),
                calls: Mutex::new(Vec::new()),
                gate: Barrier::new(racers),
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().expect("calls lock").push(call);
        }
    }

    #[async_trait]
    impl KeyValueStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
            self.record("get");
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64) -> Result<(), CacheError> {
            self.record("set");
            self.inner.set(key, value, ttl_seconds).await
        }

        async fn incr(&self, key: &str) -> Result<u64, CacheError> {
            self.record("incr");
            self.gate.wait().await;
            self.inner.incr(key).await
        }
    }

    fn versions() -> VersionStore {
        let store = MemoryStore::new(NonZeroUsize::new(16).expect("non-zero"));
        VersionStore::new(Arc::new(store))
    }

    #[tokio::test]
    async fn unset_namespace_defaults_to_one() {
        let versions = versions();
        assert_eq!(versions.get_version("pages").await.expect("version"), 1);
    }

    #[tokio::test]
    async fn bump_moves_past_the_implicit_epoch() {
        let versions = versions();
        assert_eq!(versions.bump("pages").await.expect("bump"), 2);
        assert_eq!(versions.bump("pages").await.expect("bump"), 3);
        assert_eq!(versions.get_version("pages").await.expect("version"), 3);
    }

    #[tokio::test]
    async fn namespaces_are_independent() {
        let versions = versions();
        versions.bump("pages").await.expect("bump");
        assert_eq!(versions.get_version("pages").await.expect("version"), 2);
        assert_eq!(versions.get_version("other").await.expect("version"), 1);
    }

    #[tokio::test]
    async fn independent_instances_do_not_share_state() {
        let first = versions();
        let second = versions();
        first.bump("pages").await.expect("bump");
        assert_eq!(second.get_version("pages").await.expect("version"), 1);
    }

    #[tokio::test]
    async fn bump_is_a_single_increment() {
        let store = Arc::new(RecordingStore::new(1));
        let versions = VersionStore::new(store.clone());

        assert_eq!(versions.bump("pages").await.expect("bump"), 2);
        assert_eq!(*store.calls.lock().expect("calls lock"), vec!["incr"]);
    }

    #[tokio::test]
    async fn racing_first_bumps_never_roll_the_epoch_back() {
        let store = Arc::new(RecordingStore::new(2));
        let versions = VersionStore::new(store.clone());

        let (first, second) = tokio::join!(versions.bump("pages"), versions.bump("pages"));
        let results: HashSet<u64> = [first.expect("bump"), second.expect("bump")]
            .into_iter()
            .collect();

        assert_eq!(results, HashSet::from([2, 3]));
        assert_eq!(versions.get_version("pages").await.expect("version"), 3);
        assert!(!store.calls.lock().expect("calls lock").contains(&"set"));
    }

    #[tokio::test]
    async fn concurrent_bumps_are_all_counted() {
        let versions = versions();
        versions.bump("pages").await.expect("bump");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let versions = versions.clone();
            handles.push(tokio::spawn(
                async move { versions.bump("pages").await },
            ));
        }
        for handle in handles {
            handle.await.expect("join").expect("bump");
        }

        assert_eq!(versions.get_version("pages").await.expect("version"), 10);
    }
}
