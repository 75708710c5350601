use thiserror::Error;

use super::entities::SiteId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: &'static str },
    #[error("invalid slug `{slug}`: {reason}")]
    InvalidSlug { slug: String, reason: &'static str },
    #[error("language `{code}` is configured more than once for site {site_id}")]
    DuplicateLanguage { site_id: SiteId, code: String },
    #[error("language `{code}` is not configured for site {site_id}")]
    UnknownLanguage { site_id: SiteId, code: String },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn invalid_slug(slug: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidSlug {
            slug: slug.into(),
            reason,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
