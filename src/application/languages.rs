//! Language negotiation and fallback chains.

use std::sync::Arc;

use crate::application::site::SiteRegistry;
use crate::domain::entities::SiteId;
use crate::domain::languages::{normalize_language_code, primary_subtag};

#[derive(Debug, Clone)]
pub struct LanguageResolver {
    sites: Arc<SiteRegistry>,
}

impl LanguageResolver {
    pub fn new(sites: Arc<SiteRegistry>) -> Self {
        Self { sites }
    }

    /// Codes a caller may be served, in configuration order.
    ///
    /// Privileged callers also see languages that are not public.
    pub fn candidates(&self, site_id: SiteId, is_privileged: bool) -> Vec<String> {
        self.sites
            .languages(site_id)
            .map(|languages| {
                languages
                    .candidate_codes(is_privileged)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pick the preferred language of a request.
    ///
    /// An explicitly requested language wins when it is a candidate, then the
    /// first acceptable `Accept-Language` entry, then the first candidate.
    /// `None` only when the site offers no candidate at all.
    pub fn resolve(
        &self,
        site_id: SiteId,
        requested: Option<&str>,
        accepted: &[String],
        is_privileged: bool,
    ) -> Option<String> {
        let candidates = self.candidates(site_id, is_privileged);
        if let Some(code) = requested.and_then(|tag| match_candidate(&candidates, tag)) {
            return Some(code);
        }
        accepted
            .iter()
            .find_map(|tag| match_candidate(&candidates, tag))
            .or_else(|| candidates.into_iter().next())
    }

    /// Configured fallbacks of `code`, limited to candidates of the caller.
    pub fn fallbacks(&self, site_id: SiteId, code: &str, is_privileged: bool) -> Vec<String> {
        let Some(languages) = self.sites.languages(site_id) else {
            return Vec::new();
        };
        let Some(language) = languages.get(code) else {
            return Vec::new();
        };
        let candidates = languages.candidate_codes(is_privileged);
        language
            .fallbacks
            .iter()
            .filter(|fallback| **fallback != language.code)
            .filter(|fallback| candidates.contains(&fallback.as_str()))
            .cloned()
            .collect()
    }

    pub fn redirect_on_fallback(&self, site_id: SiteId, code: &str) -> bool {
        self.sites
            .languages(site_id)
            .and_then(|languages| languages.get(code))
            .is_none_or(|language| language.redirect_on_fallback)
    }

    pub fn hide_untranslated(&self, site_id: SiteId, code: &str) -> bool {
        self.sites
            .languages(site_id)
            .and_then(|languages| languages.get(code))
            .is_none_or(|language| language.hide_untranslated)
    }

    /// Whether a leading path segment names a configured language of the site.
    pub fn is_language_prefix(&self, site_id: SiteId, segment: &str) -> bool {
        !segment.is_empty()
            && self
                .sites
                .languages(site_id)
                .is_some_and(|languages| languages.get(segment).is_some())
    }
}

/// Match a language tag against candidate codes.
///
/// Exact match first, then the tag's primary subtag (`de-at` → `de`), then a
/// regional candidate sharing the primary subtag (`en` → `en-us`).
pub fn match_candidate(candidates: &[String], tag: &str) -> Option<String> {
    let tag = normalize_language_code(tag);
    if tag.is_empty() {
        return None;
    }
    if let Some(exact) = candidates.iter().find(|code| **code == tag) {
        return Some(exact.clone());
    }
    let primary = primary_subtag(&tag);
    if let Some(generic) = candidates.iter().find(|code| code.as_str() == primary) {
        return Some(generic.clone());
    }
    candidates
        .iter()
        .find(|code| primary_subtag(code) == primary)
        .cloned()
}

/// Parse an `Accept-Language` header into tags ordered by preference.
///
/// Entries keep their header order among equal weights; `*` and entries with
/// `q=0` are dropped, malformed weights count as 1.
pub fn parse_accept_language(header: &str) -> Vec<String> {
    let mut weighted: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let tag = parts.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let weight = parts
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|value| value.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (weight > 0.0).then(|| (normalize_language_code(tag), weight))
        })
        .collect();
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
    weighted.into_iter().map(|(tag, _)| tag).collect()
}
