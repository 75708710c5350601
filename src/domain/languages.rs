//! Per-site language configuration.
//!
//! Each site carries an ordered list of languages. Order matters: it is the
//! last-resort preference order during negotiation and the order in which
//! default fallbacks are derived.

use std::collections::HashSet;

use serde::Deserialize;

use super::entities::SiteId;
use super::error::DomainError;

/// Language entry as written in configuration, before defaults are applied.
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageSpec {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub fallbacks: Option<Vec<String>>,
    #[serde(default)]
    pub redirect_on_fallback: Option<bool>,
    #[serde(default)]
    pub hide_untranslated: Option<bool>,
}

impl LanguageSpec {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            public: None,
            fallbacks: None,
            redirect_on_fallback: None,
            hide_untranslated: None,
        }
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = Some(public);
        self
    }

    pub fn fallbacks<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallbacks = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn redirect_on_fallback(mut self, redirect: bool) -> Self {
        self.redirect_on_fallback = Some(redirect);
        self
    }

    pub fn hide_untranslated(mut self, hide: bool) -> Self {
        self.hide_untranslated = Some(hide);
        self
    }
}

/// Fully resolved language entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub code: String,
    pub name: String,
    pub public: bool,
    pub fallbacks: Vec<String>,
    pub redirect_on_fallback: bool,
    pub hide_untranslated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLanguages {
    site_id: SiteId,
    languages: Vec<Language>,
}

impl SiteLanguages {
    /// Validate configured languages and apply defaults.
    ///
    /// Codes are normalised and must be unique. A language without explicit
    /// fallbacks falls back to every other public language in order.
    pub fn from_specs(site_id: SiteId, specs: Vec<LanguageSpec>) -> Result<Self, DomainError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            let code = normalize_language_code(&spec.code);
            if code.is_empty() {
                return Err(DomainError::validation(format!(
                    "site {site_id} declares a language with an empty code"
                )));
            }
            if !seen.insert(code.clone()) {
                return Err(DomainError::DuplicateLanguage { site_id, code });
            }
        }

        let public_codes: Vec<String> = specs
            .iter()
            .filter(|spec| spec.public.unwrap_or(true))
            .map(|spec| normalize_language_code(&spec.code))
            .collect();

        let mut languages = Vec::with_capacity(specs.len());
        for spec in specs {
            let code = normalize_language_code(&spec.code);
            let fallbacks = match spec.fallbacks {
                Some(explicit) => {
                    let mut resolved = Vec::with_capacity(explicit.len());
                    for raw in explicit {
                        let fallback = normalize_language_code(&raw);
                        if !seen.contains(&fallback) {
                            return Err(DomainError::UnknownLanguage {
                                site_id,
                                code: fallback,
                            });
                        }
                        if fallback != code && !resolved.contains(&fallback) {
                            resolved.push(fallback);
                        }
                    }
                    resolved
                }
                None => public_codes
                    .iter()
                    .filter(|candidate| **candidate != code)
                    .cloned()
                    .collect(),
            };

            languages.push(Language {
                name: spec.name.unwrap_or_else(|| code.clone()),
                public: spec.public.unwrap_or(true),
                fallbacks,
                redirect_on_fallback: spec.redirect_on_fallback.unwrap_or(true),
                hide_untranslated: spec.hide_untranslated.unwrap_or(true),
                code,
            });
        }

        Ok(Self { site_id, languages })
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    pub fn get(&self, code: &str) -> Option<&Language> {
        let code = normalize_language_code(code);
        self.languages.iter().find(|language| language.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Language> {
        self.languages.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    /// Codes visible to the caller, in configuration order.
    pub fn candidate_codes(&self, include_hidden: bool) -> Vec<&str> {
        self.languages
            .iter()
            .filter(|language| include_hidden || language.public)
            .map(|language| language.code.as_str())
            .collect()
    }
}

/// Lowercase a language tag and use `-` as the subtag separator (`en_US` → `en-us`).
pub fn normalize_language_code(raw: &str) -> String {
    raw.trim().replace('_', "-").to_ascii_lowercase()
}

/// Primary subtag of a language tag (`de-at` → `de`).
pub fn primary_subtag(code: &str) -> &str {
    code.split('-').next().unwrap_or(code)
}
