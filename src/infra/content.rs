//! TOML content archive and the in-memory collaborators built from it.
//!
//! ```toml
//! [[sites]]
//! id = 1
//! domain = "example.com"
//! timezone = "Europe/Paris"
//!
//! [[sites.languages]]
//! code = "en"
//!
//! [[pages]]
//! id = "about"
//! site = 1
//!
//! [[pages.contents]]
//! language = "en"
//! title = "About"
//! published = true
//!
//! [[pages.contents.placeholders]]
//! slot = "content"
//! body = "<p>About us</p>"
//! cache_ttl = 300
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::application::repos::{
    ContentRepo, FragmentRenderer, PagePublisher, PageTree, RenderContext, RepoError, Viewer,
    ViewPermissions,
};
use crate::application::site::SiteRegistry;
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::entities::{
    ContentFragment, Page, PageContent, PageId, Placeholder, Site, SiteId,
};
use crate::domain::languages::{LanguageSpec, SiteLanguages, normalize_language_code};
use crate::domain::paths::{derive_slug, join_segments, validate_slug};
use crate::domain::types::{FragmentTtl, Revision, XFrameOptions};
use crate::infra::error::InfraError;
use crate::util::timezone::parse_timezone;

const SOURCE: &str = "infra::content::InMemoryContent";
const DEFAULT_TEMPLATE: &str = "default";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContentArchive {
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
    #[serde(default)]
    pub pages: Vec<PageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub id: u32,
    pub domain: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub languages: Vec<LanguageSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageEntry {
    pub id: String,
    pub site: u32,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub is_home: bool,
    #[serde(default)]
    pub login_required: bool,
    #[serde(default)]
    pub xframe_options: XFrameOptions,
    /// Users allowed to view the page; unrestricted when absent.
    #[serde(default)]
    pub view_users: Option<Vec<String>>,
    #[serde(default)]
    pub contents: Vec<ContentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub language: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default = "default_revision")]
    pub revision: Revision,
    #[serde(default)]
    pub placeholders: Vec<PlaceholderEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceholderEntry {
    pub slot: String,
    #[serde(default)]
    pub body: String,
    /// Seconds; `0` marks the slot uncacheable, absent means no opinion.
    #[serde(default)]
    pub cache_ttl: Option<u64>,
    #[serde(default)]
    pub vary_on: Vec<String>,
}

fn default_revision() -> Revision {
    Revision::Public
}

impl ContentArchive {
    pub fn parse(text: &str) -> Result<Self, InfraError> {
        toml::from_str(text).map_err(|err| InfraError::content(format!("malformed TOML: {err}")))
    }

    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text)
    }
}

#[derive(Debug, Clone)]
struct PageRecord {
    page: Page,
    view_users: Option<BTreeSet<String>>,
}

type ContentKey = (PageId, String, Revision);

#[derive(Debug, Default)]
struct ContentState {
    /// Sorted by site, position and id.
    pages: Vec<PageRecord>,
    contents: HashMap<ContentKey, PageContent>,
}

impl ContentState {
    fn page(&self, id: &PageId) -> Option<&PageRecord> {
        self.pages.iter().find(|record| &record.page.id == id)
    }

    fn home(&self, site_id: SiteId) -> Option<&Page> {
        self.pages
            .iter()
            .map(|record| &record.page)
            .find(|page| page.site_id == site_id && page.is_home)
    }

    fn has_slug(&self, page: &PageId, slug: &str) -> bool {
        self.contents
            .values()
            .any(|content| &content.page_id == page && content.slug == slug)
    }
}

/// Counts reported by the `check` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentSummary {
    pub sites: usize,
    pub pages: usize,
    pub contents: usize,
}

/// Page tree, contents, permissions, renderer and publisher held in memory.
#[derive(Debug, Default)]
pub struct InMemoryContent {
    state: RwLock<ContentState>,
}

impl InMemoryContent {
    /// Validate an archive and split it into the site registry and the content store.
    pub fn from_archive(archive: ContentArchive) -> Result<(SiteRegistry, Self), InfraError> {
        let ContentArchive { sites, pages } = archive;
        let registry = build_registry(sites)?;
        let state = build_state(&registry, pages)?;
        info!(
            target_module = SOURCE,
            sites = registry.iter().count(),
            pages = state.pages.len(),
            contents = state.contents.len(),
            "Loaded content archive"
        );
        Ok((
            registry,
            Self {
                state: RwLock::new(state),
            },
        ))
    }

    pub fn summary(&self) -> ContentSummary {
        let state = rw_read(&self.state, SOURCE, "summary");
        let sites: HashSet<SiteId> = state.pages.iter().map(|record| record.page.site_id).collect();
        ContentSummary {
            sites: sites.len(),
            pages: state.pages.len(),
            contents: state.contents.len(),
        }
    }
}

fn build_registry(sites: Vec<SiteEntry>) -> Result<SiteRegistry, InfraError> {
    let mut entries = Vec::with_capacity(sites.len());
    for entry in sites {
        let id = SiteId(entry.id);
        if entry.languages.is_empty() {
            return Err(InfraError::content(format!(
                "site {id} declares no languages"
            )));
        }
        let timezone = entry
            .timezone
            .as_deref()
            .map(parse_timezone)
            .transpose()
            .map_err(|err| InfraError::content(format!("site {id}: {err}")))?;
        let languages = SiteLanguages::from_specs(id, entry.languages)
            .map_err(|err| InfraError::content(format!("site {id}: {err}")))?;
        let site = Site {
            id,
            name: entry.name.unwrap_or_else(|| entry.domain.clone()),
            domain: entry.domain,
            timezone,
        };
        entries.push((site, languages));
    }
    SiteRegistry::new(entries).map_err(|err| InfraError::content(err.to_string()))
}

fn build_state(registry: &SiteRegistry, entries: Vec<PageEntry>) -> Result<ContentState, InfraError> {
    let mut pages: Vec<PageRecord> = Vec::with_capacity(entries.len());
    let mut slugs: HashMap<ContentKey, String> = HashMap::new();
    let mut raw_contents: Vec<(PageId, ContentEntry, String)> = Vec::new();

    for entry in entries {
        let id = PageId::new(entry.id.trim());
        if id.as_str().is_empty() {
            return Err(InfraError::content("page with an empty id"));
        }
        if pages.iter().any(|record| record.page.id == id) {
            return Err(InfraError::content(format!("page `{id}` is declared twice")));
        }
        let site_id = SiteId(entry.site);
        let Some(languages) = registry.languages(site_id) else {
            return Err(InfraError::content(format!(
                "page `{id}` belongs to unknown site {site_id}"
            )));
        };
        if entry.is_home
            && pages
                .iter()
                .any(|record| record.page.site_id == site_id && record.page.is_home)
        {
            return Err(InfraError::content(format!(
                "site {site_id} has more than one home page"
            )));
        }

        for content in entry.contents {
            let language = normalize_language_code(&content.language);
            if languages.get(&language).is_none() {
                return Err(InfraError::content(format!(
                    "page `{id}` has content in `{language}`, which site {site_id} does not configure"
                )));
            }
            let key = (id.clone(), language.clone(), content.revision);
            if slugs.contains_key(&key) {
                return Err(InfraError::content(format!(
                    "page `{id}` has two {} contents in `{language}`",
                    content.revision
                )));
            }
            let slug = match content.slug.as_deref().map(str::trim) {
                Some(slug) => {
                    validate_slug(slug)
                        .map_err(|err| InfraError::content(format!("page `{id}`: {err}")))?;
                    slug.to_string()
                }
                None => derive_slug(&content.title)
                    .map_err(|err| InfraError::content(format!("page `{id}`: {err}")))?,
            };
            slugs.insert(key, slug);
            raw_contents.push((id.clone(), content, language));
        }

        pages.push(PageRecord {
            page: Page {
                id,
                site_id,
                parent: entry
                    .parent
                    .map(|parent| PageId::new(parent.trim()))
                    .filter(|parent| !parent.as_str().is_empty()),
                position: entry.position,
                is_home: entry.is_home,
                login_required: entry.login_required,
                xframe_options: entry.xframe_options,
            },
            view_users: entry
                .view_users
                .map(|users| users.into_iter().map(|user| user.trim().to_string()).collect()),
        });
    }

    for record in &pages {
        let Some(parent) = record.page.parent.as_ref() else {
            continue;
        };
        match pages.iter().find(|candidate| &candidate.page.id == parent) {
            Some(found) if found.page.site_id == record.page.site_id => {}
            Some(_) => {
                return Err(InfraError::content(format!(
                    "page `{}` has a parent on another site",
                    record.page.id
                )));
            }
            None => {
                return Err(InfraError::content(format!(
                    "page `{}` has unknown parent `{parent}`",
                    record.page.id
                )));
            }
        }
    }

    pages.sort_by(|a, b| {
        (a.page.site_id, a.page.position, &a.page.id).cmp(&(b.page.site_id, b.page.position, &b.page.id))
    });

    let paths = PathIndex {
        pages: &pages,
        slugs: &slugs,
    };
    let mut contents = HashMap::with_capacity(raw_contents.len());
    let mut seen_paths: HashSet<(SiteId, String, Revision, String)> = HashSet::new();
    for (page_id, entry, language) in raw_contents {
        let path = paths.resolve(&page_id, &language, entry.revision, 0)?;
        let Some(record) = pages.iter().find(|record| record.page.id == page_id) else {
            continue;
        };
        if !seen_paths.insert((record.page.site_id, language.clone(), entry.revision, path.clone())) {
            return Err(InfraError::content(format!(
                "path `/{path}` is used by more than one page in `{language}`"
            )));
        }
        let key = (page_id.clone(), language.clone(), entry.revision);
        let slug = slugs.get(&key).cloned().unwrap_or_default();
        let content = PageContent {
            page_id,
            language,
            slug,
            path,
            title: entry.title,
            template: entry
                .template
                .filter(|template| !template.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            redirect: entry.redirect.filter(|target| !target.trim().is_empty()),
            published: entry.published,
            revision: entry.revision,
            placeholders: entry
                .placeholders
                .into_iter()
                .map(|placeholder| Placeholder {
                    slot: placeholder.slot,
                    body: placeholder.body,
                    cache_ttl: FragmentTtl::from_config(placeholder.cache_ttl),
                    vary_on: placeholder.vary_on.into_iter().collect(),
                })
                .collect(),
        };
        contents.insert(key, content);
    }

    Ok(ContentState { pages, contents })
}

/// Resolves the slash separated path of a content from its ancestors' slugs.
struct PathIndex<'a> {
    pages: &'a [PageRecord],
    slugs: &'a HashMap<ContentKey, String>,
}

impl PathIndex<'_> {
    fn resolve(
        &self,
        page_id: &PageId,
        language: &str,
        revision: Revision,
        depth: usize,
    ) -> Result<String, InfraError> {
        if depth > self.pages.len() {
            return Err(InfraError::content(format!(
                "page `{page_id}` is part of a parent cycle"
            )));
        }
        let Some(record) = self.pages.iter().find(|record| &record.page.id == page_id) else {
            return Err(InfraError::content(format!("unknown page `{page_id}`")));
        };
        if record.page.is_home {
            return Ok(String::new());
        }
        let slug = self.slug(page_id, language, revision).ok_or_else(|| {
            InfraError::content(format!("page `{page_id}` has no content to derive a path from"))
        })?;
        match record.page.parent.as_ref() {
            None => Ok(slug.to_string()),
            Some(parent) => {
                let prefix = self.resolve(parent, language, revision, depth + 1)?;
                Ok(join_segments([prefix.as_str(), slug]))
            }
        }
    }

    /// Slug in the requested language and revision, else the closest substitute.
    fn slug(&self, page_id: &PageId, language: &str, revision: Revision) -> Option<&str> {
        let other = match revision {
            Revision::Draft => Revision::Public,
            Revision::Public => Revision::Draft,
        };
        self.slugs
            .get(&(page_id.clone(), language.to_string(), revision))
            .or_else(|| self.slugs.get(&(page_id.clone(), language.to_string(), other)))
            .or_else(|| {
                let mut candidates: Vec<_> = self
                    .slugs
                    .iter()
                    .filter(|((id, _, _), _)| id == page_id)
                    .collect();
                candidates.sort_by(|a, b| a.0.cmp(b.0));
                candidates.first().map(|(_, slug)| *slug)
            })
            .map(String::as_str)
    }
}

#[async_trait]
impl PageTree for InMemoryContent {
    async fn home(&self, site_id: SiteId) -> Result<Option<Page>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "home");
        Ok(state.home(site_id).cloned())
    }

    async fn child_by_slug(
        &self,
        site_id: SiteId,
        parent: Option<&PageId>,
        slug: &str,
    ) -> Result<Option<Page>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "child_by_slug");
        // Children of the home page live at the root of the URL space.
        let home = state.home(site_id).map(|page| page.id.clone());
        let found = state
            .pages
            .iter()
            .map(|record| &record.page)
            .filter(|page| page.site_id == site_id)
            .filter(|page| match parent {
                Some(parent) => page.parent.as_ref() == Some(parent),
                None => page.parent.is_none() || page.parent == home,
            })
            .find(|page| state.has_slug(&page.id, slug))
            .cloned();
        Ok(found)
    }
}

#[async_trait]
impl ContentRepo for InMemoryContent {
    async fn find_content(
        &self,
        page: &PageId,
        language: &str,
        revision: Revision,
    ) -> Result<Option<PageContent>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_content");
        Ok(state
            .contents
            .get(&(page.clone(), normalize_language_code(language), revision))
            .cloned())
    }

    async fn languages(&self, page: &PageId, revision: Revision) -> Result<Vec<String>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "languages");
        Ok(state
            .contents
            .keys()
            .filter(|(id, _, rev)| id == page && *rev == revision)
            .map(|(_, language, _)| language.clone())
            .collect())
    }
}

#[async_trait]
impl ViewPermissions for InMemoryContent {
    async fn has_view_permission(
        &self,
        viewer: &Viewer,
        page: &Page,
        _site_id: SiteId,
    ) -> Result<bool, RepoError> {
        if viewer.is_privileged {
            return Ok(true);
        }
        let state = rw_read(&self.state, SOURCE, "has_view_permission");
        let Some(record) = state.page(&page.id) else {
            return Err(RepoError::NotFound);
        };
        Ok(match (&record.view_users, viewer.user.as_deref()) {
            (None, _) => true,
            (Some(users), Some(user)) => users.contains(user),
            (Some(_), None) => false,
        })
    }
}

#[async_trait]
impl FragmentRenderer for InMemoryContent {
    async fn render_fragments(
        &self,
        content: &PageContent,
        _context: &RenderContext,
    ) -> Result<Vec<ContentFragment>, RepoError> {
        Ok(content
            .placeholders
            .iter()
            .map(|placeholder| {
                ContentFragment::new(
                    placeholder.slot.clone(),
                    placeholder.body.clone(),
                    placeholder.cache_ttl,
                )
                .with_vary_on(placeholder.vary_on.iter().cloned())
            })
            .collect())
    }
}

#[async_trait]
impl PagePublisher for InMemoryContent {
    async fn publish(&self, page: &PageId, language: &str) -> Result<PageContent, RepoError> {
        let language = normalize_language_code(language);
        let mut state = rw_write(&self.state, SOURCE, "publish");
        let Some(draft) = state
            .contents
            .get(&(page.clone(), language.clone(), Revision::Draft))
            .cloned()
        else {
            return Err(RepoError::NotFound);
        };
        let public = PageContent {
            revision: Revision::Public,
            published: true,
            ..draft
        };
        state
            .contents
            .insert((page.clone(), language, Revision::Public), public.clone());
        Ok(public)
    }
}
