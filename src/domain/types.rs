//! Shared domain enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which of the two revisions of a page content is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Revision {
    Draft,
    Public,
}

impl Revision {
    pub fn as_str(self) -> &'static str {
        match self {
            Revision::Draft => "draft",
            Revision::Public => "public",
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page-level `X-Frame-Options` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XFrameOptions {
    /// Defer to the deployment default.
    #[default]
    Inherit,
    Deny,
    SameOrigin,
    /// Framing allowed; no header is emitted.
    Allow,
}

impl XFrameOptions {
    /// Header value for this policy, `None` when no header should be sent.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            XFrameOptions::Deny => Some("DENY"),
            XFrameOptions::SameOrigin => Some("SAMEORIGIN"),
            XFrameOptions::Inherit | XFrameOptions::Allow => None,
        }
    }
}

/// Cache lifetime reported by a rendered fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentTtl {
    /// Cacheable for at most this many seconds.
    Seconds(u64),
    /// Must never be cached; forces the whole page uncacheable.
    Now,
    /// No opinion; the configured ceiling applies.
    Unbounded,
}

impl FragmentTtl {
    /// Interpret a configured lifetime: `0` means "now", absent means unbounded.
    pub fn from_config(seconds: Option<u64>) -> Self {
        match seconds {
            Some(0) => FragmentTtl::Now,
            Some(value) => FragmentTtl::Seconds(value),
            None => FragmentTtl::Unbounded,
        }
    }

    pub fn is_now(self) -> bool {
        matches!(self, FragmentTtl::Now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xframe_header_values() {
        assert_eq!(XFrameOptions::Deny.header_value(), Some("DENY"));
        assert_eq!(XFrameOptions::SameOrigin.header_value(), Some("SAMEORIGIN"));
        assert_eq!(XFrameOptions::Allow.header_value(), None);
        assert_eq!(XFrameOptions::Inherit.header_value(), None);
    }

    #[test]
    fn fragment_ttl_from_config() {
        assert_eq!(FragmentTtl::from_config(Some(0)), FragmentTtl::Now);
        assert_eq!(FragmentTtl::from_config(Some(30)), FragmentTtl::Seconds(30));
        assert_eq!(FragmentTtl::from_config(None), FragmentTtl::Unbounded);
    }

    #[test]
    fn revision_serializes_snake_case() {
        let json = serde_json::to_string(&Revision::Draft).expect("serialize revision");
        assert_eq!(json, "\"draft\"");
    }
}
