//! Sites served by this deployment and their language configuration.

use std::collections::HashMap;

use crate::domain::entities::{Site, SiteId};
use crate::domain::error::DomainError;
use crate::domain::languages::SiteLanguages;

#[derive(Debug, Clone)]
struct SiteEntry {
    site: Site,
    languages: SiteLanguages,
}

/// Immutable lookup table of sites, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    entries: Vec<SiteEntry>,
    by_domain: HashMap<String, SiteId>,
}

impl SiteRegistry {
    pub fn new(sites: Vec<(Site, SiteLanguages)>) -> Result<Self, DomainError> {
        let mut entries: Vec<SiteEntry> = Vec::with_capacity(sites.len());
        let mut by_domain = HashMap::new();

        for (site, languages) in sites {
            if entries.iter().any(|entry| entry.site.id == site.id) {
                return Err(DomainError::validation(format!(
                    "site {} is declared twice",
                    site.id
                )));
            }
            if languages.site_id() != site.id {
                return Err(DomainError::validation(format!(
                    "languages of site {} are attached to site {}",
                    languages.site_id(),
                    site.id
                )));
            }
            let domain = normalize_host(&site.domain);
            if !domain.is_empty() && by_domain.insert(domain.clone(), site.id).is_some() {
                return Err(DomainError::validation(format!(
                    "domain `{domain}` is served by more than one site"
                )));
            }
            entries.push(SiteEntry { site, languages });
        }

        Ok(Self { entries, by_domain })
    }

    pub fn site(&self, id: SiteId) -> Option<&Site> {
        self.entry(id).map(|entry| &entry.site)
    }

    pub fn languages(&self, id: SiteId) -> Option<&SiteLanguages> {
        self.entry(id).map(|entry| &entry.languages)
    }

    /// Site serving `host` (port ignored), or the first declared site.
    pub fn by_host(&self, host: Option<&str>) -> Option<&Site> {
        host.map(normalize_host)
            .and_then(|host| self.by_domain.get(&host).copied())
            .and_then(|id| self.site(id))
            .or_else(|| self.default_site())
    }

    pub fn default_site(&self) -> Option<&Site> {
        self.entries.first().map(|entry| &entry.site)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.entries.iter().map(|entry| &entry.site)
    }

    fn entry(&self, id: SiteId) -> Option<&SiteEntry> {
        self.entries.iter().find(|entry| entry.site.id == id)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    without_port.to_ascii_lowercase()
}
