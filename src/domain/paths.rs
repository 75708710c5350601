//! Slug and request-path helpers shared by the resolvers and the cache key codec.

use slug::slugify;

use super::error::DomainError;

/// Validate a single path segment used as a page slug.
pub fn validate_slug(slug: &str) -> Result<(), DomainError> {
    if slug.trim().is_empty() {
        return Err(DomainError::invalid_slug(slug, "slug must not be empty"));
    }
    if slug.contains('/') {
        return Err(DomainError::invalid_slug(slug, "slug must not contain `/`"));
    }
    if slug.chars().any(char::is_whitespace) {
        return Err(DomainError::invalid_slug(
            slug,
            "slug must not contain whitespace",
        ));
    }
    if slug.contains('?') || slug.contains('#') {
        return Err(DomainError::invalid_slug(
            slug,
            "slug must not contain `?` or `#`",
        ));
    }
    Ok(())
}

/// Derive a slug from a human readable title.
pub fn derive_slug(title: &str) -> Result<String, DomainError> {
    let candidate = slugify(title);
    if candidate.is_empty() {
        return Err(DomainError::invalid_slug(
            title,
            "title does not produce a usable slug",
        ));
    }
    Ok(candidate)
}

/// Non-empty segments of a path, ignoring query string and fragment.
pub fn segments(path: &str) -> Vec<&str> {
    strip_query(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Join segments into the slash separated form stored on page contents.
pub fn join_segments<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalise a request path for comparison and hashing.
///
/// Drops query and fragment, forces a single leading slash, collapses
/// duplicate slashes and applies the trailing slash convention. The root is
/// always `/`.
pub fn normalize_path(path: &str, append_slash: bool) -> String {
    let parts = segments(path);
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut normalized = String::with_capacity(path.len() + 2);
    for part in parts {
        normalized.push('/');
        normalized.push_str(part);
    }
    if append_slash {
        normalized.push('/');
    }
    normalized
}

/// Build the public URL of a page path, optionally prefixed by its language.
pub fn page_url(language: Option<&str>, page_path: &str, append_slash: bool) -> String {
    let joined = match language {
        Some(code) => format!("/{code}/{page_path}"),
        None => format!("/{page_path}"),
    };
    normalize_path(&joined, append_slash)
}

fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}
