//! Map request paths to pages and pick the content revision to serve.

use std::sync::Arc;

use tracing::debug;

use crate::application::repos::{ContentRepo, PageTree, RepoError};
use crate::application::site::SiteRegistry;
use crate::domain::entities::{Page, PageContent, SiteId};
use crate::domain::paths::segments;
use crate::domain::types::Revision;

#[derive(Clone)]
pub struct PageResolver {
    tree: Arc<dyn PageTree>,
    contents: Arc<dyn ContentRepo>,
    sites: Arc<SiteRegistry>,
}

impl PageResolver {
    pub fn new(
        tree: Arc<dyn PageTree>,
        contents: Arc<dyn ContentRepo>,
        sites: Arc<SiteRegistry>,
    ) -> Self {
        Self {
            tree,
            contents,
            sites,
        }
    }

    /// Page at `path` together with its content in `language`.
    pub async fn resolve(
        &self,
        site_id: SiteId,
        path: &str,
        language: &str,
        editing: bool,
    ) -> Result<Option<(Page, PageContent)>, RepoError> {
        let Some(page) = self.find_page(site_id, path).await? else {
            return Ok(None);
        };
        let content = self.select_content(&page, language, editing).await?;
        Ok(content.map(|content| (page, content)))
    }

    /// Walk the page tree from the roots, one slug per path segment.
    ///
    /// An empty path resolves to the site's home page.
    pub async fn find_page(&self, site_id: SiteId, path: &str) -> Result<Option<Page>, RepoError> {
        let parts = segments(path);
        if parts.is_empty() {
            return self.tree.home(site_id).await;
        }

        let mut current: Option<Page> = None;
        for slug in parts {
            let parent = current.as_ref().map(|page| &page.id);
            match self.tree.child_by_slug(site_id, parent, slug).await? {
                Some(page) => current = Some(page),
                None => {
                    debug!(site_id = %site_id, path, slug, "no page matches path segment");
                    return Ok(None);
                }
            }
        }
        Ok(current)
    }

    /// Content of `page` in `language`.
    ///
    /// Editors prefer the draft and fall back to the public revision; everyone
    /// else only gets a published public revision.
    pub async fn select_content(
        &self,
        page: &Page,
        language: &str,
        editing: bool,
    ) -> Result<Option<PageContent>, RepoError> {
        if editing {
            if let Some(draft) = self
                .contents
                .find_content(&page.id, language, Revision::Draft)
                .await?
            {
                return Ok(Some(draft));
            }
            return self
                .contents
                .find_content(&page.id, language, Revision::Public)
                .await;
        }

        if !self.contents.is_published(&page.id, language).await? {
            return Ok(None);
        }
        let content = self
            .contents
            .find_content(&page.id, language, Revision::Public)
            .await?;
        Ok(content.filter(PageContent::is_public_and_published))
    }

    /// Languages `page` can be served in, in the site's configuration order.
    pub async fn available_languages(
        &self,
        page: &Page,
        editing: bool,
    ) -> Result<Vec<String>, RepoError> {
        let mut present = Vec::new();
        for code in self.contents.languages(&page.id, Revision::Public).await? {
            if editing || self.contents.is_published(&page.id, &code).await? {
                present.push(code);
            }
        }
        if editing {
            present.extend(self.contents.languages(&page.id, Revision::Draft).await?);
        }

        let Some(languages) = self.sites.languages(page.site_id) else {
            return Ok(Vec::new());
        };
        Ok(languages
            .iter()
            .filter(|language| present.iter().any(|code| *code == language.code))
            .map(|language| language.code.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::entities::{PageId, Site};
    use crate::domain::languages::{LanguageSpec, SiteLanguages};
    use crate::domain::types::XFrameOptions;

    #[derive(Default)]
    struct Fixture {
        pages: Vec<(Page, &'static str)>,
        contents: HashMap<(String, String, Revision), PageContent>,
        lookups: Mutex<Vec<String>>,
    }

    impl Fixture {
        fn page(mut self, id: &str, parent: Option<&str>, slug: &'static str, home: bool) -> Self {
            self.pages.push((
                Page {
                    id: PageId::new(id),
                    site_id: SiteId(1),
                    parent: parent.map(PageId::new),
                    position: 0,
                    is_home: home,
                    login_required: false,
                    xframe_options: XFrameOptions::Inherit,
                },
                slug,
            ));
            self
        }

        fn content(mut self, page: &str, language: &str, revision: Revision, published: bool) -> Self {
            self.contents.insert(
                (page.to_string(), language.to_string(), revision),
                PageContent {
                    page_id: PageId::new(page),
                    language: language.to_string(),
                    slug: page.to_string(),
                    path: page.to_string(),
                    title: format!("{page} ({language})"),
                    template: "default".to_string(),
                    redirect: None,
                    published,
                    revision,
                    placeholders: Vec::new(),
                },
            );
            self
        }
    }

    #[async_trait]
    impl PageTree for Fixture {
        async fn home(&self, _site_id: SiteId) -> Result<Option<Page>, RepoError> {
            Ok(self.pages.iter().find(|(page, _)| page.is_home).map(|(page, _)| page.clone()))
        }

        async fn child_by_slug(
            &self,
            _site_id: SiteId,
            parent: Option<&PageId>,
            slug: &str,
        ) -> Result<Option<Page>, RepoError> {
            self.lookups.lock().expect("lookups").push(slug.to_string());
            Ok(self
                .pages
                .iter()
                .find(|(page, page_slug)| page.parent.as_ref() == parent && *page_slug == slug)
                .map(|(page, _)| page.clone()))
        }
    }

    #[async_trait]
    impl ContentRepo for Fixture {
        async fn find_content(
            &self,
            page: &PageId,
            language: &str,
            revision: Revision,
        ) -> Result<Option<PageContent>, RepoError> {
            Ok(self
                .contents
                .get(&(page.to_string(), language.to_string(), revision))
                .cloned())
        }

        async fn languages(&self, page: &PageId, revision: Revision) -> Result<Vec<String>, RepoError> {
            Ok(self
                .contents
                .keys()
                .filter(|(id, _, rev)| id == page.as_str() && *rev == revision)
                .map(|(_, language, _)| language.clone())
                .collect())
        }
    }

    fn resolver(fixture: Fixture) -> (PageResolver, Arc<Fixture>) {
        let fixture = Arc::new(fixture);
        let site = Site {
            id: SiteId(1),
            domain: "example.com".to_string(),
            name: "Example".to_string(),
            timezone: None,
        };
        let languages = SiteLanguages::from_specs(
            SiteId(1),
            vec![LanguageSpec::new("en"), LanguageSpec::new("fr"), LanguageSpec::new("de")],
        )
        .expect("languages");
        let sites = Arc::new(SiteRegistry::new(vec![(site, languages)]).expect("registry"));
        (
            PageResolver::new(fixture.clone(), fixture.clone(), sites),
            fixture,
        )
    }

    fn tree() -> Fixture {
        Fixture::default()
            .page("home", None, "home", true)
            .page("about", None, "about", false)
            .page("team", Some("about"), "team", false)
            .content("home", "en", Revision::Public, true)
            .content("about", "en", Revision::Public, true)
            .content("about", "fr", Revision::Public, false)
            .content("about", "de", Revision::Draft, false)
            .content("team", "en", Revision::Public, true)
    }

    #[tokio::test]
    async fn empty_path_is_the_home_page() {
        let (resolver, _) = resolver(tree());
        let page = resolver.find_page(SiteId(1), "/").await.expect("lookup");
        assert_eq!(page.map(|page| page.id), Some(PageId::new("home")));
    }

    #[tokio::test]
    async fn walks_the_tree_segment_by_segment() {
        let (resolver, fixture) = resolver(tree());
        let page = resolver
            .find_page(SiteId(1), "/about/team/")
            .await
            .expect("lookup");
        assert_eq!(page.map(|page| page.id), Some(PageId::new("team")));
        assert_eq!(*fixture.lookups.lock().expect("lookups"), vec!["about", "team"]);
    }

    #[tokio::test]
    async fn unknown_segment_stops_the_walk() {
        let (resolver, fixture) = resolver(tree());
        let page = resolver
            .find_page(SiteId(1), "/missing/team/")
            .await
            .expect("lookup");
        assert!(page.is_none());
        assert_eq!(*fixture.lookups.lock().expect("lookups"), vec!["missing"]);
    }

    #[tokio::test]
    async fn unpublished_content_is_hidden_unless_editing() {
        let (resolver, _) = resolver(tree());
        let page = resolver
            .find_page(SiteId(1), "about")
            .await
            .expect("lookup")
            .expect("page");

        assert!(resolver.select_content(&page, "fr", false).await.expect("select").is_none());
        let editing = resolver.select_content(&page, "fr", true).await.expect("select");
        assert_eq!(editing.map(|c| c.revision), Some(Revision::Public));

        let draft = resolver.select_content(&page, "de", true).await.expect("select");
        assert_eq!(draft.map(|c| c.revision), Some(Revision::Draft));
        assert!(resolver.select_content(&page, "de", false).await.expect("select").is_none());
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let (resolver, _) = resolver(tree());
        let first = resolver
            .resolve(SiteId(1), "/about/", "en", false)
            .await
            .expect("resolve");
        let second = resolver
            .resolve(SiteId(1), "/about/", "en", false)
            .await
            .expect("resolve");
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn available_languages_follow_configuration_order() {
        let (resolver, _) = resolver(tree());
        let page = resolver
            .find_page(SiteId(1), "about")
            .await
            .expect("lookup")
            .expect("page");
        assert_eq!(
            resolver.available_languages(&page, false).await.expect("languages"),
            vec!["en"]
        );
        assert_eq!(
            resolver.available_languages(&page, true).await.expect("languages"),
            vec!["en", "fr", "de"]
        );
    }
}
