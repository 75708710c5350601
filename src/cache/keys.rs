//! Response cache key derivation.
//!
//! Keys never embed the cache epoch. The epoch is combined by the response
//! cache at read/write time, so a single bump invalidates every key of the
//! namespace without recomputing any of them.

use sha2::{Digest, Sha256};

use crate::domain::entities::SiteId;
use crate::domain::languages::normalize_language_code;
use crate::domain::paths::normalize_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheKeyCodec {
    append_slash: bool,
}

impl CacheKeyCodec {
    pub fn new(append_slash: bool) -> Self {
        Self { append_slash }
    }

    /// Derive the cache key for a rendered page.
    ///
    /// The digest covers the site, the normalised path (query string and
    /// fragment dropped) and the language. Language and timezone label stay
    /// readable at the end of the key.
    pub fn encode(
        &self,
        namespace: &str,
        site_id: SiteId,
        path: &str,
        language: &str,
        tz_label: Option<&str>,
    ) -> String {
        let path = normalize_path(path, self.append_slash);
        let language = normalize_language_code(language);

        let mut hasher = Sha256::new();
        hasher.update(site_id.0.to_be_bytes());
        hasher.update([0u8]);
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(language.as_bytes());
        let digest = hex::encode(hasher.finalize());

        match tz_label {
            Some(label) if !label.is_empty() => {
                format!("{namespace}:{site_id}:{digest}:{language}:{label}")
            }
            _ => format!("{namespace}:{site_id}:{digest}:{language}"),
        }
    }
}

impl Default for CacheKeyCodec {
    fn default() -> Self {
        Self::new(true)
    }
}
