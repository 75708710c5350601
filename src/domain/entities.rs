//! Domain entities for sites, the page tree and page contents.

use std::collections::BTreeSet;
use std::fmt;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::types::{FragmentTtl, Revision, XFrameOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub u32);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub id: SiteId,
    pub domain: String,
    pub name: String,
    pub timezone: Option<Tz>,
}

/// Language-independent tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    pub parent: Option<PageId>,
    pub position: u32,
    pub is_home: bool,
    pub login_required: bool,
    pub xframe_options: XFrameOptions,
}

/// Language and revision specific content of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub page_id: PageId,
    pub language: String,
    pub slug: String,
    /// Slash separated path from the site root, without surrounding slashes.
    pub path: String,
    pub title: String,
    pub template: String,
    pub redirect: Option<String>,
    pub published: bool,
    pub revision: Revision,
    pub placeholders: Vec<Placeholder>,
}

impl PageContent {
    pub fn is_public_and_published(&self) -> bool {
        self.revision == Revision::Public && self.published
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub slot: String,
    pub body: String,
    pub cache_ttl: FragmentTtl,
    pub vary_on: BTreeSet<String>,
}

/// Rendered output of one placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFragment {
    pub slot: String,
    pub html: String,
    pub ttl: FragmentTtl,
    pub vary_on: BTreeSet<String>,
}

impl ContentFragment {
    pub fn new(slot: impl Into<String>, html: impl Into<String>, ttl: FragmentTtl) -> Self {
        Self {
            slot: slot.into(),
            html: html.into(),
            ttl,
            vary_on: BTreeSet::new(),
        }
    }

    pub fn with_vary_on<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vary_on = headers.into_iter().map(Into::into).collect();
        self
    }
}
