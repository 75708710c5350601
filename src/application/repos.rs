//! Collaborator traits describing content and permission adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{ContentFragment, Page, PageContent, PageId, SiteId};
use crate::domain::error::DomainError;
use crate::domain::types::Revision;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("render failure in slot `{slot}`: {message}")]
    Render { slot: String, message: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Caller identity as seen by permission checks and renderers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub user: Option<String>,
    pub is_privileged: bool,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Request facts handed to the fragment renderer.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub site_id: SiteId,
    pub path: String,
    pub language: String,
    pub viewer: Viewer,
    pub editing: bool,
}

#[async_trait]
pub trait PageTree: Send + Sync {
    async fn home(&self, site_id: SiteId) -> Result<Option<Page>, RepoError>;

    /// Child of `parent` (a root page when `None`) carrying `slug` in any language.
    async fn child_by_slug(
        &self,
        site_id: SiteId,
        parent: Option<&PageId>,
        slug: &str,
    ) -> Result<Option<Page>, RepoError>;
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn find_content(
        &self,
        page: &PageId,
        language: &str,
        revision: Revision,
    ) -> Result<Option<PageContent>, RepoError>;

    async fn is_published(&self, page: &PageId, language: &str) -> Result<bool, RepoError> {
        let content = self.find_content(page, language, Revision::Public).await?;
        Ok(content.is_some_and(|content| content.is_public_and_published()))
    }

    fn get_redirect(&self, content: &PageContent) -> Option<String> {
        content
            .redirect
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .map(str::to_string)
    }

    /// Languages with content of the given revision, in no particular order.
    async fn languages(&self, page: &PageId, revision: Revision) -> Result<Vec<String>, RepoError>;
}

#[async_trait]
pub trait ViewPermissions: Send + Sync {
    async fn has_view_permission(
        &self,
        viewer: &Viewer,
        page: &Page,
        site_id: SiteId,
    ) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait FragmentRenderer: Send + Sync {
    async fn render_fragments(
        &self,
        content: &PageContent,
        context: &RenderContext,
    ) -> Result<Vec<ContentFragment>, RepoError>;
}

#[async_trait]
pub trait PagePublisher: Send + Sync {
    /// Copy the draft content of `page` in `language` into the public slot.
    async fn publish(&self, page: &PageId, language: &str) -> Result<PageContent, RepoError>;
}
