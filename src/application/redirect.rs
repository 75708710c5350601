//! Decide whether a resolved page should be answered with a redirect.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::application::languages::LanguageResolver;
use crate::application::repos::ContentRepo;
use crate::domain::entities::{Page, PageContent};
use crate::domain::paths::{normalize_path, page_url};

/// Everything the resolver needs to know about the page being served.
#[derive(Debug, Clone, Copy)]
pub struct RedirectTarget<'a> {
    pub page: &'a Page,
    pub content: &'a PageContent,
    pub preferred_language: &'a str,
    pub served_language: &'a str,
    /// Apply the explicit redirect stored on the content.
    pub follow_explicit: bool,
}

#[derive(Clone)]
pub struct RedirectResolver {
    languages: LanguageResolver,
    contents: Arc<dyn ContentRepo>,
    language_prefix: bool,
    append_slash: bool,
}

impl RedirectResolver {
    pub fn new(
        languages: LanguageResolver,
        contents: Arc<dyn ContentRepo>,
        language_prefix: bool,
        append_slash: bool,
    ) -> Self {
        Self {
            languages,
            contents,
            language_prefix,
            append_slash,
        }
    }

    /// Redirect URL for the request, or `None` to render the page.
    ///
    /// `requested_path` is the request path without its language prefix and
    /// `own_urls` the set built by [`own_candidate_urls`]. A target that points
    /// back at the request itself is dropped.
    pub fn compute(
        &self,
        target: &RedirectTarget<'_>,
        requested_path: &str,
        own_urls: &HashSet<String>,
    ) -> Option<String> {
        let url = self.candidate(target, requested_path)?;
        if own_urls.contains(&normalize_url(&url)) {
            debug!(url, "redirect target is the request itself; rendering instead");
            return None;
        }
        Some(url)
    }

    /// The explicit redirect of the served content with the language prefix
    /// applied, when the served language is the preferred one.
    pub fn explicit_target(&self, target: &RedirectTarget<'_>) -> Option<String> {
        if target.served_language != target.preferred_language {
            return None;
        }
        let redirect = self.contents.get_redirect(target.content)?;
        Some(self.prefixed(&redirect, target.served_language))
    }

    fn candidate(&self, target: &RedirectTarget<'_>, requested_path: &str) -> Option<String> {
        if target.follow_explicit {
            if let Some(explicit) = self.explicit_target(target) {
                return Some(explicit);
            }
        }

        if target.served_language != target.preferred_language {
            let redirect = target.page.is_home
                || self
                    .languages
                    .redirect_on_fallback(target.page.site_id, target.preferred_language);
            if redirect {
                return Some(self.canonical_url(target.content, target.served_language));
            }
            return None;
        }

        let requested = normalize_path(requested_path, self.append_slash);
        let canonical = normalize_path(&target.content.path, self.append_slash);
        if requested != canonical {
            return Some(self.canonical_url(target.content, target.served_language));
        }
        None
    }

    fn canonical_url(&self, content: &PageContent, language: &str) -> String {
        let prefix = self.language_prefix.then_some(language);
        page_url(prefix, &content.path, self.append_slash)
    }

    fn prefixed(&self, redirect: &str, language: &str) -> String {
        if !self.language_prefix || !redirect.starts_with('/') || redirect.starts_with("//") {
            return redirect.to_string();
        }
        let bare = format!("/{language}");
        if redirect == bare || redirect.starts_with(&format!("{bare}/")) {
            return redirect.to_string();
        }
        format!("{bare}{redirect}")
    }
}

/// URLs under which the current request may be addressed.
///
/// Holds the absolute URL and the path with and without a leading slash, all
/// normalised the same way redirect targets are before comparison.
pub fn own_candidate_urls(secure: bool, host: Option<&str>, path: &str) -> HashSet<String> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_start_matches('/');
    let mut urls = HashSet::new();
    if let Some(host) = host.filter(|host| !host.is_empty()) {
        let scheme = if secure { "https" } else { "http" };
        urls.insert(normalize_url(&format!("{scheme}://{host}/{trimmed}")));
    }
    urls.insert(normalize_url(path));
    urls.insert(normalize_url(&format!("/{trimmed}")));
    urls.insert(normalize_url(trimmed));
    urls
}

fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split(['?', '#']).next().unwrap_or(url);
    let trimmed = url.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
