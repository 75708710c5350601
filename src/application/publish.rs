use std::sync::Arc;

use tracing::info;

use crate::application::repos::{PagePublisher, RepoError};
use crate::cache::ResponseCache;
use crate::domain::entities::{PageContent, PageId};
use crate::domain::languages::normalize_language_code;

const SOURCE: &str = "application::publish::PublishService";

/// Publishes drafts and invalidates every cached page of the namespace.
#[derive(Clone)]
pub struct PublishService {
    publisher: Arc<dyn PagePublisher>,
    cache: ResponseCache,
}

impl PublishService {
    pub fn new(publisher: Arc<dyn PagePublisher>, cache: ResponseCache) -> Self {
        Self { publisher, cache }
    }

    pub async fn publish(&self, page: &PageId, language: &str) -> Result<PageContent, RepoError> {
        let language = normalize_language_code(language);
        let content = self.publisher.publish(page, &language).await?;
        let epoch = self.cache.invalidate_all().await;
        info!(
            target_module = SOURCE,
            page = %page,
            language = %language,
            epoch = ?epoch,
            "published page content"
        );
        Ok(content)
    }

    /// Bump the cache epoch without publishing anything.
    pub async fn invalidate(&self) -> Option<u64> {
        self.cache.invalidate_all().await
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::cache::MemoryStore;
    use crate::domain::types::Revision;

    #[derive(Default)]
    struct RecordingPublisher {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PagePublisher for RecordingPublisher {
        async fn publish(&self, page: &PageId, language: &str) -> Result<PageContent, RepoError> {
            self.calls
                .lock()
                .expect("calls")
                .push((page.to_string(), language.to_string()));
            if page.as_str() == "missing" {
                return Err(RepoError::NotFound);
            }
            Ok(PageContent {
                page_id: page.clone(),
                language: language.to_string(),
                slug: "about".to_string(),
                path: "about".to_string(),
                title: "About".to_string(),
                template: "default".to_string(),
                redirect: None,
                published: true,
                revision: Revision::Public,
                placeholders: Vec::new(),
            })
        }
    }

    fn cache() -> ResponseCache {
        ResponseCache::new(
            Arc::new(MemoryStore::new(NonZeroUsize::new(16).expect("non-zero"))),
            "pages",
        )
    }

    #[tokio::test]
    async fn publishing_bumps_the_epoch() {
        let cache = cache();
        cache
            .put("k", Bytes::from_static(b"old"), Vec::new(), 60)
            .await;
        let publisher = Arc::new(RecordingPublisher::default());
        let service = PublishService::new(publisher.clone(), cache.clone());

        let content = service
            .publish(&PageId::new("about"), "FR")
            .await
            .expect("published");

        assert_eq!(content.language, "fr");
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.versions().get_version("pages").await.expect("version"), 2);
        assert_eq!(
            *publisher.calls.lock().expect("calls"),
            vec![("about".to_string(), "fr".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_publish_keeps_the_cache() {
        let cache = cache();
        cache.put("k", Bytes::from_static(b"old"), Vec::new(), 60).await;
        let service = PublishService::new(Arc::new(RecordingPublisher::default()), cache.clone());

        assert!(service.publish(&PageId::new("missing"), "en").await.is_err());
        assert!(cache.get("k").await.is_some());
    }
}
